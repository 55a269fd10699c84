//! # parley-core
//!
//! Foundation types shared by every Parley crate.
//!
//! - [`envelope::Envelope`]: the `{kind, payload}` wrapper for every frame
//!   crossing the socket boundary, in both directions
//! - [`events`]: the closed set of event kinds and their typed payloads
//! - [`identity::Identity`]: the authenticated user attached to a connection
//! - [`ids::ConnectionId`]: unique identity of a live connection
//! - [`logging::init_subscriber`]: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod envelope;
pub mod events;
pub mod identity;
pub mod ids;
pub mod logging;

pub use envelope::{Envelope, EnvelopeError};
pub use events::{ChangeRoomPayload, EventKind, NewMessagePayload, SendMessagePayload};
pub use identity::Identity;
pub use ids::ConnectionId;

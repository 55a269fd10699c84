//! # parley-server
//!
//! Axum HTTP + `WebSocket` connection manager.
//!
//! - Upgrade entry point with an origin allow-list and connection limit
//! - Per-connection read and write pumps with ping/pong liveness
//! - Connection registry with room-scoped fanout
//! - Event router dispatching envelopes to `change_room` / `send_message` handlers
//! - `/health`, `/metrics` and room history endpoints
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod origin;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, ParleyServer};

//! # parley-store
//!
//! Storage collaborators consumed by the socket layer:
//!
//! - [`MessageStore`]: persists chat messages and reads room history
//! - [`DisplayNames`]: resolves an email to the name shown to other users
//!
//! [`SqliteStore`] implements both on an `r2d2` pool of `rusqlite`
//! connections. Blocking database work runs on tokio's blocking pool.

#![deny(unsafe_code)]

pub mod errors;
pub mod migrations;
pub mod pool;
pub mod sqlite;
pub mod traits;

pub use errors::{Result, StoreError};
pub use pool::{ConnectionPool, PoolConfig};
pub use sqlite::SqliteStore;
pub use traits::{ChatRecord, DEFAULT_HISTORY_LIMIT, DisplayNames, MessageStore, NewChat};

//! Settings types.

use std::fmt::Display;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Accepted `maxFrameBytes`.
pub const MAX_FRAME_BYTES: RangeInclusive<usize> = 64..=16 * 1024 * 1024;
/// Accepted `pongWaitMs`.
pub const PONG_WAIT_MS: RangeInclusive<u64> = 100..=600_000;
/// Accepted `outboundCapacity`.
pub const OUTBOUND_CAPACITY: RangeInclusive<usize> = 1..=65_536;
/// Accepted `enqueueTimeoutMs`.
pub const ENQUEUE_TIMEOUT_MS: RangeInclusive<u64> = 1..=600_000;
/// Accepted `maxConnections`.
pub const MAX_CONNECTIONS: RangeInclusive<usize> = 1..=1_000_000;
/// Accepted `poolSize`.
pub const POOL_SIZE: RangeInclusive<u32> = 1..=64;

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Socket server settings.
    pub server: ServerSettings,
    /// Chat storage settings.
    pub store: StoreSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl ParleySettings {
    /// Check every bounded value, wherever it came from.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        check("server.maxFrameBytes", server.max_frame_bytes, &MAX_FRAME_BYTES)?;
        check("server.pongWaitMs", server.pong_wait_ms, &PONG_WAIT_MS)?;
        check("server.outboundCapacity", server.outbound_capacity, &OUTBOUND_CAPACITY)?;
        check("server.enqueueTimeoutMs", server.enqueue_timeout_ms, &ENQUEUE_TIMEOUT_MS)?;
        check("server.maxConnections", server.max_connections, &MAX_CONNECTIONS)?;
        check("store.poolSize", self.store.pool_size, &POOL_SIZE)?;
        if server.default_room.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "server.defaultRoom must not be blank".into(),
            ));
        }
        Ok(())
    }
}

fn check<T: PartialOrd + Display>(key: &str, value: T, range: &RangeInclusive<T>) -> Result<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue(format!(
            "{key} = {value} is outside {}..={}",
            range.start(),
            range.end()
        )))
    }
}

/// Socket server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` to auto-assign).
    pub port: u16,
    /// Origins allowed to open a socket.
    pub allowed_origins: Vec<String>,
    /// Largest accepted inbound frame/message, in bytes.
    pub max_frame_bytes: usize,
    /// How long to wait for a pong before declaring a connection dead.
    pub pong_wait_ms: u64,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// How long a broadcast waits on one full outbound queue.
    pub enqueue_timeout_ms: u64,
    /// Room assigned to new connections.
    pub default_room: String,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            allowed_origins: vec!["https://localhost:4000".to_string()],
            max_frame_bytes: 512,
            pong_wait_ms: 10_000,
            outbound_capacity: 1,
            enqueue_timeout_ms: 5_000,
            default_room: "general".to_string(),
            max_connections: 1024,
        }
    }
}

/// Chat storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Database path, relative paths resolve under `~/.parley`.
    pub db_path: String,
    /// Connection pool size.
    pub pool_size: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "parley.db".to_string(),
            pool_size: 8,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

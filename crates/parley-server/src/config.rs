//! Server configuration.

use std::time::Duration;

use parley_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the Parley server.
///
/// Built once at startup and handed to [`crate::ParleyServer`]; nothing in
/// the upgrade path reads process-wide state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Origins allowed to open a socket.
    pub allowed_origins: Vec<String>,
    /// Max inbound frame and message size in bytes.
    pub max_frame_bytes: usize,
    /// Close a connection after this long without a pong.
    pub pong_wait_ms: u64,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// How long a broadcast waits on one full outbound queue.
    pub enqueue_timeout_ms: u64,
    /// Room assigned when the upgrade request names none.
    pub default_room: String,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            allowed_origins: vec!["https://localhost:4000".into()],
            max_frame_bytes: 512,
            pong_wait_ms: 10_000,
            outbound_capacity: 1,
            enqueue_timeout_ms: 5_000,
            default_room: "general".into(),
            max_connections: 1024,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            allowed_origins: settings.allowed_origins.clone(),
            max_frame_bytes: settings.max_frame_bytes,
            pong_wait_ms: settings.pong_wait_ms,
            outbound_capacity: settings.outbound_capacity,
            enqueue_timeout_ms: settings.enqueue_timeout_ms,
            default_room: settings.default_room.clone(),
            max_connections: settings.max_connections,
        }
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Read deadline window.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Per-recipient broadcast enqueue bound.
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.allowed_origins, vec!["https://localhost:4000"]);
        assert_eq!(cfg.max_frame_bytes, 512);
        assert_eq!(cfg.outbound_capacity, 1);
        assert_eq!(cfg.default_room, "general");
        assert_eq!(cfg.max_connections, 1024);
    }

    #[test]
    fn durations() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.pong_wait(), Duration::from_secs(10));
        assert_eq!(cfg.enqueue_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn from_settings_copies_every_field() {
        let settings = ServerSettings {
            host: "0.0.0.0".into(),
            port: 9090,
            allowed_origins: vec!["https://chat.example.com".into()],
            max_frame_bytes: 4096,
            pong_wait_ms: 2_000,
            outbound_capacity: 8,
            enqueue_timeout_ms: 250,
            default_room: "lobby".into(),
            max_connections: 3,
        };
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9090");
        assert_eq!(cfg.allowed_origins, settings.allowed_origins);
        assert_eq!(cfg.max_frame_bytes, 4096);
        assert_eq!(cfg.pong_wait(), Duration::from_secs(2));
        assert_eq!(cfg.outbound_capacity, 8);
        assert_eq!(cfg.enqueue_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.default_room, "lobby");
        assert_eq!(cfg.max_connections, 3);
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = r#"{"host":"10.0.0.1","port":3000,"allowed_origins":[],"max_frame_bytes":1024,
            "pong_wait_ms":500,"outbound_capacity":2,"enqueue_timeout_ms":100,
            "default_room":"r","max_connections":5}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.host, "10.0.0.1");
        assert_eq!(cfg.port, 3000);
        assert!(cfg.allowed_origins.is_empty());
        assert_eq!(cfg.max_connections, 5);
    }
}

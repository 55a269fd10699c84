//! # parley-settings
//!
//! Configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ParleySettings::default()`]
//! 2. **User file**: `~/.parley/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PARLEY_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    parley_home, settings_path,
};
pub use types::{LoggingSettings, ParleySettings, ServerSettings, StoreSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = ParleySettings::default();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 4000);
        assert_eq!(
            settings.server.allowed_origins,
            vec!["https://localhost:4000".to_string()]
        );
        assert_eq!(settings.server.max_frame_bytes, 512);
        assert_eq!(settings.server.pong_wait_ms, 10_000);
        assert_eq!(settings.server.outbound_capacity, 1);
        assert_eq!(settings.server.default_room, "general");
        assert_eq!(settings.logging.level, "info");
        assert!(!settings.logging.json);
    }
}

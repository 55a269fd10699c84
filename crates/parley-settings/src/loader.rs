//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If `~/.parley/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `PARLEY_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{
    ENQUEUE_TIMEOUT_MS, MAX_CONNECTIONS, MAX_FRAME_BYTES, OUTBOUND_CAPACITY, PONG_WAIT_MS,
    ParleySettings,
};

/// Resolve the Parley home directory (`~/.parley`).
pub fn parley_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley")
}

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    parley_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON, or a merged
/// result that fails [`ParleySettings::validate`], is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ParleySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PARLEY_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut ParleySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply `PARLEY_*` overrides using `lookup` to read variables.
///
/// Invalid values are logged and ignored.
pub fn apply_overrides(settings: &mut ParleySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("PARLEY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed_in("PARLEY_PORT", &(0..=u16::MAX)) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("PARLEY_ALLOWED_ORIGINS") {
        settings.server.allowed_origins = parse_list(&v);
    }
    if let Some(v) = env.parsed_in("PARLEY_MAX_FRAME_BYTES", &MAX_FRAME_BYTES) {
        settings.server.max_frame_bytes = v;
    }
    if let Some(v) = env.parsed_in("PARLEY_PONG_WAIT_MS", &PONG_WAIT_MS) {
        settings.server.pong_wait_ms = v;
    }
    if let Some(v) = env.parsed_in("PARLEY_OUTBOUND_CAPACITY", &OUTBOUND_CAPACITY) {
        settings.server.outbound_capacity = v;
    }
    if let Some(v) = env.parsed_in("PARLEY_ENQUEUE_TIMEOUT_MS", &ENQUEUE_TIMEOUT_MS) {
        settings.server.enqueue_timeout_ms = v;
    }
    if let Some(v) = env.string("PARLEY_DEFAULT_ROOM") {
        settings.server.default_room = v;
    }
    if let Some(v) = env.parsed_in("PARLEY_MAX_CONNECTIONS", &MAX_CONNECTIONS) {
        settings.server.max_connections = v;
    }

    // ── Store ───────────────────────────────────────────────────────
    if let Some(v) = env.string("PARLEY_DB_PATH") {
        settings.store.db_path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PARLEY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("PARLEY_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a value and keep it only if it lies within `min..=max`.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma separated list, dropping blank entries.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn parsed_in<T>(&self, name: &str, range: &RangeInclusive<T>) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd + Copy,
    {
        let val = self.string(name)?;
        let result = parse_in_range(&val, *range.start(), *range.end());
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}

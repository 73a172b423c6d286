//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`DlstreamSettings::default()`]
//! 2. If `~/.dlstream/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `DLSTREAM_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{DlstreamSettings, PolicyKind};

/// Resolve the path to the settings file (`~/.dlstream/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".dlstream").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<DlstreamSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// [`DlstreamSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<DlstreamSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<DlstreamSettings> {
    let defaults = serde_json::to_value(DlstreamSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply `DLSTREAM_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut DlstreamSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Each variable has strict parsing rules:
/// - Integers must be valid and within range
/// - Booleans accept `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (file/default value wins)
pub fn apply_overrides(settings: &mut DlstreamSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Env { lookup };
    let channel = &mut settings.channel;

    // ── Channel ─────────────────────────────────────────────────────
    if let Some(v) = env.string("DLSTREAM_URL") {
        channel.url = v;
    }
    if let Some(v) = env.u64("DLSTREAM_MAX_ATTEMPTS", 0, 1000) {
        channel.max_attempts = u32::try_from(v).unwrap_or(channel.max_attempts);
    }
    if let Some(v) = env.u64("DLSTREAM_INTERVAL_MS", 1, 3_600_000) {
        channel.interval_ms = v;
    }
    if let Some(v) = env.bool("DLSTREAM_AUTOSTART") {
        channel.autostart = v;
    }
    if let Some(v) = env.policy("DLSTREAM_POLICY") {
        channel.policy = v;
    }
    if let Some(v) = env.u64("DLSTREAM_BACKOFF_MAX_MS", 1, 3_600_000) {
        channel.backoff_max_ms = v;
    }
    if let Some(v) = env.u64("DLSTREAM_KEEPALIVE_MS", 0, 3_600_000) {
        channel.keepalive_interval_ms = v;
    }
    if let Some(v) = env.u64("DLSTREAM_MAX_FRAME_BYTES", 0, 1 << 30) {
        channel.max_frame_bytes = usize::try_from(v).unwrap_or(channel.max_frame_bytes);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("DLSTREAM_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("DLSTREAM_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = env.string("DLSTREAM_LOG_ENDPOINT") {
        settings.logging.endpoint = Some(v);
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a reconnect policy name (`fixed` or `exponential`).
pub fn parse_policy(val: &str) -> Option<PolicyKind> {
    match val.to_lowercase().as_str() {
        "fixed" => Some(PolicyKind::Fixed),
        "exponential" | "backoff" => Some(PolicyKind::Exponential),
        _ => None,
    }
}

// ── Variable readers ─────────────────────────────────────────────────────────

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "boolean", parse_bool)
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "integer", |v| parse_u64_range(v, min, max))
    }

    fn policy(&self, name: &str) -> Option<PolicyKind> {
        self.parsed(name, "policy", parse_policy)
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use serde_json::json;

    fn overrides(pairs: &[(&str, &str)]) -> DlstreamSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = DlstreamSettings::default();
        apply_overrides(&mut settings, |name| vars.get(name).cloned());
        settings
    }

    // -- deep_merge --

    #[test]
    fn deep_merge_nested_objects() {
        let target = json!({"channel": {"url": "ws://a", "maxAttempts": 5}});
        let source = json!({"channel": {"maxAttempts": 9}});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"channel": {"url": "ws://a", "maxAttempts": 9}}));
    }

    #[test]
    fn deep_merge_null_preserves_target() {
        let merged = deep_merge(json!({"level": "info"}), json!({"level": null}));
        assert_eq!(merged, json!({"level": "info"}));
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let merged = deep_merge(json!({"a": [1, 2, 3]}), json!({"a": [4]}));
        assert_eq!(merged, json!({"a": [4]}));
    }

    // -- file loading --

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_file_layer(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, DlstreamSettings::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"channel": {"url": "wss://nas.lan/api/ws", "policy": "exponential"}, "logging": {"endpoint": "http://collector/logs"}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.channel.url, "wss://nas.lan/api/ws");
        assert_eq!(settings.channel.policy, PolicyKind::Exponential);
        assert_eq!(settings.channel.max_attempts, 5);
        assert_eq!(
            settings.logging.endpoint.as_deref(),
            Some("http://collector/logs")
        );
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_file_layer(&path).is_err());
    }

    #[test]
    fn invalid_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"channel": {"url": "http://nas.lan"}}"#).unwrap();
        let settings = load_file_layer(&path).unwrap();
        assert!(settings.validate().is_err());
    }

    // -- overrides --

    #[test]
    fn overrides_apply() {
        let settings = overrides(&[
            ("DLSTREAM_URL", "ws://10.0.0.2:8000/api/ws"),
            ("DLSTREAM_MAX_ATTEMPTS", "12"),
            ("DLSTREAM_AUTOSTART", "off"),
            ("DLSTREAM_POLICY", "Exponential"),
            ("DLSTREAM_KEEPALIVE_MS", "0"),
            ("DLSTREAM_LOG_ENDPOINT", "http://collector/logs"),
        ]);
        assert_eq!(settings.channel.url, "ws://10.0.0.2:8000/api/ws");
        assert_eq!(settings.channel.max_attempts, 12);
        assert!(!settings.channel.autostart);
        assert_eq!(settings.channel.policy, PolicyKind::Exponential);
        assert_eq!(settings.channel.keepalive_interval_ms, 0);
        assert_eq!(
            settings.logging.endpoint.as_deref(),
            Some("http://collector/logs")
        );
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let settings = overrides(&[
            ("DLSTREAM_MAX_ATTEMPTS", "many"),
            ("DLSTREAM_INTERVAL_MS", "0"),
            ("DLSTREAM_AUTOSTART", "maybe"),
            ("DLSTREAM_POLICY", "linear"),
            ("DLSTREAM_URL", ""),
        ]);
        assert_eq!(settings, DlstreamSettings::default());
    }

    // -- pure parsers --

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("1", 1, 10), Some(1));
        assert_eq!(parse_u64_range("10", 1, 10), Some(10));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 1, 10), None);
    }

    #[test]
    fn parse_policy_names() {
        assert_eq!(parse_policy("fixed"), Some(PolicyKind::Fixed));
        assert_eq!(parse_policy("backoff"), Some(PolicyKind::Exponential));
        assert_eq!(parse_policy("random"), None);
    }

    #[test]
    fn settings_path_under_home() {
        let path = settings_path();
        assert!(path.ends_with(".dlstream/settings.json"));
    }
}

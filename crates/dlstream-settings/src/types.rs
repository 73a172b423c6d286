//! Settings type definitions.
//!
//! All types use camelCase field names and implement [`Default`] with the
//! production defaults, so a settings file only needs the keys it changes:
//!
//! ```json
//! {
//!   "channel": { "url": "wss://downloads.lan/api/ws", "maxAttempts": 10 },
//!   "logging": { "level": "debug" }
//! }
//! ```

use std::time::Duration;

use dlstream_core::reconnect::{
    DEFAULT_INTERVAL_MS, DEFAULT_JITTER_FACTOR, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS,
};
use dlstream_core::{ExponentialBackoff, FixedInterval, ReconnectPolicy};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DlstreamSettings {
    /// Live channel connection.
    pub channel: ChannelSettings,
    /// Local and remote logging.
    pub logging: LoggingSettings,
}

impl DlstreamSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.channel.validate()
    }
}

/// Which reconnect policy to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Constant `intervalMs` between attempts.
    #[default]
    Fixed,
    /// Doubling delay from `intervalMs` up to `backoffMaxMs`, with jitter.
    Exponential,
}

/// Live channel settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Reconnects before giving up.
    pub max_attempts: u32,
    /// Fixed delay, or exponential base, in milliseconds.
    pub interval_ms: u64,
    /// Connect as soon as the client is built.
    pub autostart: bool,
    /// Reconnect policy.
    pub policy: PolicyKind,
    /// Exponential delay cap in milliseconds.
    pub backoff_max_ms: u64,
    /// Exponential jitter, 0.0–1.0.
    pub jitter_factor: f64,
    /// Ping interval in milliseconds; 0 disables keepalive.
    pub keepalive_interval_ms: u64,
    /// Inbound frames larger than this are dropped; 0 disables the check.
    pub max_frame_bytes: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/api/ws".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval_ms: DEFAULT_INTERVAL_MS,
            autostart: true,
            policy: PolicyKind::Fixed,
            backoff_max_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            keepalive_interval_ms: 30_000,
            max_frame_bytes: 1_048_576,
        }
    }
}

impl ChannelSettings {
    /// Build the configured reconnect policy.
    pub fn build_policy(&self) -> Box<dyn ReconnectPolicy> {
        match self.policy {
            PolicyKind::Fixed => Box::new(FixedInterval::new(
                self.max_attempts,
                Duration::from_millis(self.interval_ms),
            )),
            PolicyKind::Exponential => Box::new(ExponentialBackoff {
                max_attempts: self.max_attempts,
                base: Duration::from_millis(self.interval_ms),
                max_delay: Duration::from_millis(self.backoff_max_ms),
                jitter_factor: self.jitter_factor,
            }),
        }
    }

    /// Keepalive interval, `None` when disabled.
    pub fn keepalive(&self) -> Option<Duration> {
        (self.keepalive_interval_ms > 0).then(|| Duration::from_millis(self.keepalive_interval_ms))
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue(format!(
                "channel.url must use ws:// or wss://, got {:?}",
                self.url
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(SettingsError::InvalidValue(format!(
                "channel.jitterFactor must be within 0.0..=1.0, got {}",
                self.jitter_factor
            )));
        }
        if self.interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "channel.intervalMs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
    /// Collector URL for terminal failures and malformed frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            endpoint: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_snapshot() {
        insta::assert_json_snapshot!(DlstreamSettings::default(), @r#"
        {
          "channel": {
            "url": "ws://localhost:8000/api/ws",
            "maxAttempts": 5,
            "intervalMs": 3000,
            "autostart": true,
            "policy": "fixed",
            "backoffMaxMs": 60000,
            "jitterFactor": 0.2,
            "keepaliveIntervalMs": 30000,
            "maxFrameBytes": 1048576
          },
          "logging": {
            "level": "info",
            "json": false
          }
        }
        "#);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: DlstreamSettings =
            serde_json::from_str(r#"{"channel": {"maxAttempts": 2}}"#).unwrap();
        assert_eq!(settings.channel.max_attempts, 2);
        assert_eq!(settings.channel.interval_ms, 3000);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn fixed_policy_from_settings() {
        let channel = ChannelSettings {
            max_attempts: 2,
            interval_ms: 100,
            ..ChannelSettings::default()
        };
        let policy = channel.build_policy();
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), None);
    }

    #[test]
    fn exponential_policy_from_settings() {
        let channel = ChannelSettings {
            policy: PolicyKind::Exponential,
            interval_ms: 100,
            backoff_max_ms: 250,
            jitter_factor: 0.0,
            ..ChannelSettings::default()
        };
        let policy = channel.build_policy();
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(250)));
    }

    #[test]
    fn keepalive_zero_disables() {
        let channel = ChannelSettings {
            keepalive_interval_ms: 0,
            ..ChannelSettings::default()
        };
        assert_eq!(channel.keepalive(), None);
        assert_eq!(
            ChannelSettings::default().keepalive(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn validate_rejects_http_url() {
        let mut settings = DlstreamSettings::default();
        settings.channel.url = "http://localhost:8000/api/ws".into();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("ws:// or wss://"));
    }

    #[test]
    fn validate_rejects_jitter_out_of_range() {
        let mut settings = DlstreamSettings::default();
        settings.channel.jitter_factor = 1.5;
        assert!(settings.validate().is_err());
        settings.channel.jitter_factor = 1.0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn policy_kind_serde() {
        let kind: PolicyKind = serde_json::from_str("\"exponential\"").unwrap();
        assert_eq!(kind, PolicyKind::Exponential);
    }
}

//! Logging types shared across the crate.

use serde::{Deserialize, Serialize};

/// Severity of a record forwarded to a [`crate::LogSink`].
///
/// Ordered by severity, so sinks filter with `level >= min_level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Outcomes, summaries.
    Info,
    /// Non-fatal issues (malformed frames).
    Warn,
    /// Errors (terminal connection loss).
    Error,
}

impl LogLevel {
    /// Level named by the first directive of a filter string such as
    /// `"warn"` or `"debug,hyper=info"`.
    ///
    /// `trace` folds into `Debug`; unknown or target-scoped directives fall
    /// back to `Info`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        let directive = s.split(',').next().unwrap_or_default().trim();
        match directive.to_lowercase().as_str() {
            "trace" | "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// One record forwarded to a remote sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// ISO 8601 timestamp.
    pub timestamp: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
    /// Emitting component.
    pub source: String,
}

impl LogRecord {
    /// Build a record stamped with the current time.
    #[must_use]
    pub fn now(
        level: LogLevel,
        message: impl Into<String>,
        details: serde_json::Value,
        source: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            message: message.into(),
            details,
            source: source.into(),
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
    fn log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn log_level_serde() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        let back: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, LogLevel::Error);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
    }

    #[test]
    fn log_level_from_filter_string() {
        assert_eq!(LogLevel::from_str_lossy("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::from_str_lossy("trace"), LogLevel::Debug);
        assert_eq!(LogLevel::from_str_lossy("error,dlstream_client=debug"), LogLevel::Error);
        assert_eq!(LogLevel::from_str_lossy("dlstream_client=debug"), LogLevel::Info);
        assert_eq!(LogLevel::from_str_lossy(""), LogLevel::Info);
    }

    #[test]
    fn record_omits_null_details() {
        let record = LogRecord::now(LogLevel::Error, "gone", serde_json::Value::Null, "channel");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("details").is_none());
        assert_eq!(json["level"], "error");
        assert_eq!(json["source"], "channel");
    }
}

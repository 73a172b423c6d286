//! Log sink seam.
//!
//! The channel client reports only two kinds of events to a sink: terminal
//! connection loss and malformed inbound frames. Everything else stays in
//! `tracing`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::types::LogLevel;

/// Destination for operator-visible channel events.
///
/// Implementations must not block: `log` is called from the connection
/// actor.
pub trait LogSink: Send + Sync {
    /// Record one event.
    fn log(&self, level: LogLevel, message: &str, details: Value);
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn log(&self, level: LogLevel, message: &str, details: Value) {
        (**self).log(level, message, details);
    }
}

/// One entry held by [`MemorySink`].
#[derive(Clone, Debug, PartialEq)]
pub struct SinkEntry {
    /// Severity.
    pub level: LogLevel,
    /// Message.
    pub message: String,
    /// Structured context.
    pub details: Value,
}

/// In-memory sink for tests and embedding.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<SinkEntry>>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn entries(&self) -> Vec<SinkEntry> {
        self.entries.lock().clone()
    }

    /// Number of entries at `level`.
    pub fn count_at_level(&self, level: LogLevel) -> usize {
        self.entries.lock().iter().filter(|e| e.level == level).count()
    }

    /// Whether any entry's message contains `needle`.
    pub fn has_message(&self, needle: &str) -> bool {
        self.entries.lock().iter().any(|e| e.message.contains(needle))
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str, details: Value) {
        self.entries.lock().push(SinkEntry {
            level,
            message: message.to_owned(),
            details,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.log(LogLevel::Warn, "malformed frame", json!({"reason": "invalid_json"}));
        sink.log(LogLevel::Error, "connection lost", json!({"attempts": 5}));

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "malformed frame");
        assert_eq!(entries[1].details["attempts"], 5);
        assert_eq!(sink.count_at_level(LogLevel::Error), 1);
    }

    #[test]
    fn clones_share_storage() {
        let sink = MemorySink::new();
        let shared: Arc<dyn LogSink> = Arc::new(sink.clone());
        shared.log(LogLevel::Warn, "via trait object", Value::Null);
        assert!(sink.has_message("trait object"));
        sink.clear();
        assert!(sink.entries().is_empty());
    }
}

//! # dlstream-logging
//!
//! Logging for the download-manager channel client.
//!
//! - [`init_subscriber`] / [`init_json_subscriber`] set up the global
//!   `tracing` subscriber
//! - [`LogLevel`] and [`LogRecord`] describe records forwarded off-process
//! - [`LogSink`] is the seam the client reports terminal failures and
//!   malformed frames through; [`HttpLogSink`] batches them to a collector
//! - [`capture_logs`] records events in memory for test assertions

#![deny(unsafe_code)]

pub mod http;
pub mod sink;
pub mod test_utils;
pub mod types;

pub use http::{HttpLogSink, HttpSinkConfig, spawn_flush_task};
pub use sink::{LogSink, MemorySink, SinkEntry};
pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};
pub use types::{LogLevel, LogRecord};

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with human-readable stderr output.
///
/// `RUST_LOG` wins over `level` when set. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // no-op if a global subscriber is already set
    let _ = subscriber.try_init();
}

/// Like [`init_subscriber`], but one JSON object per line.
pub fn init_json_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! HTTP log sink.
//!
//! [`HttpLogSink`] buffers [`LogRecord`]s in memory and POSTs them as a JSON
//! array to a collector endpoint.
//!
//! # Batching Strategy
//!
//! - Records below `min_level` are discarded.
//! - **Immediate flush** when level is warn or above.
//! - **Threshold flush** when the buffer reaches `batch_size`.
//! - **Periodic flush** via [`spawn_flush_task`] (default 1 second).
//! - The buffer holds at most `max_buffered` records; the oldest are dropped
//!   when the collector is unreachable.
//!
//! `log` never performs I/O. It only pushes into the buffer and wakes the
//! flush task.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::sink::LogSink;
use crate::types::{LogLevel, LogRecord};

/// Configuration for [`HttpLogSink`].
#[derive(Clone, Debug)]
pub struct HttpSinkConfig {
    /// Collector URL receiving `POST` batches.
    pub endpoint: String,
    /// Value of each record's `source` field.
    pub source: String,
    /// Minimum level to forward. Default: info.
    pub min_level: LogLevel,
    /// Records before a threshold flush. Default: 50.
    pub batch_size: usize,
    /// Upper bound on buffered records. Default: 1000.
    pub max_buffered: usize,
    /// Periodic flush interval. Default: 1s.
    pub flush_interval: Duration,
}

impl HttpSinkConfig {
    /// Defaults for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            source: "dlstream".to_string(),
            min_level: LogLevel::Info,
            batch_size: 50,
            max_buffered: 1000,
            flush_interval: Duration::from_secs(1),
        }
    }
}

struct SinkInner {
    config: HttpSinkConfig,
    client: reqwest::Client,
    buffer: Mutex<VecDeque<LogRecord>>,
    wake: Notify,
}

/// Batched JSON-over-HTTP log sink. Cheap to clone.
#[derive(Clone)]
pub struct HttpLogSink {
    inner: Arc<SinkInner>,
}

impl std::fmt::Debug for HttpLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLogSink")
            .field("endpoint", &self.inner.config.endpoint)
            .field("buffered", &self.buffered())
            .finish()
    }
}

impl HttpLogSink {
    /// Create a sink. Nothing is sent until [`Self::flush`] runs, usually from
    /// [`spawn_flush_task`].
    #[must_use]
    pub fn new(config: HttpSinkConfig) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                buffer: Mutex::new(VecDeque::with_capacity(config.batch_size)),
                config,
                client: reqwest::Client::new(),
                wake: Notify::new(),
            }),
        }
    }

    /// Records waiting to be sent.
    pub fn buffered(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Push a fully formed record.
    pub fn push(&self, record: LogRecord) {
        let config = &self.inner.config;
        if record.level < config.min_level {
            return;
        }
        let urgent = record.level >= LogLevel::Warn;
        let len = {
            let mut buffer = self.inner.buffer.lock();
            if buffer.len() >= config.max_buffered {
                let _ = buffer.pop_front();
            }
            buffer.push_back(record);
            buffer.len()
        };
        if urgent || len >= config.batch_size {
            self.inner.wake.notify_one();
        }
    }

    /// Send everything buffered as one batch. Returns the number of records
    /// sent. On failure the batch is dropped.
    pub async fn flush(&self) -> Result<usize, reqwest::Error> {
        let batch = std::mem::take(&mut *self.inner.buffer.lock());
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();
        let _ = self
            .inner
            .client
            .post(&self.inner.config.endpoint)
            .json(&batch)
            .send()
            .await?
            .error_for_status()?;
        debug!(count, endpoint = %self.inner.config.endpoint, "flushed log batch");
        Ok(count)
    }
}

impl LogSink for HttpLogSink {
    fn log(&self, level: LogLevel, message: &str, details: Value) {
        self.push(LogRecord::now(
            level,
            message,
            details,
            self.inner.config.source.clone(),
        ));
    }
}

/// Spawn the flush loop for `sink`.
///
/// Flushes on the configured interval and whenever an urgent record or a
/// full batch wakes it. Abort the returned handle on shutdown after a final
/// [`HttpLogSink::flush`].
pub fn spawn_flush_task(sink: HttpLogSink) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sink.inner.config.flush_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                () = sink.inner.wake.notified() => {}
            }
            if let Err(error) = sink.flush().await {
                warn!(%error, endpoint = %sink.inner.config.endpoint, "log batch dropped");
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

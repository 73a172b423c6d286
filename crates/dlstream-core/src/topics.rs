//! Download-manager topics and payloads.
//!
//! Topic keys multiplexed on the channel:
//!
//! | Key                | Payload                |
//! |--------------------|------------------------|
//! | `progress`         | [`DownloadProgress`]   |
//! | `progress:<id>`    | [`DownloadProgress`]   |
//! | `log:<id>`         | [`DownloadLogLine`]    |
//! | `status`           | [`SystemStatus`]       |
//! | `heartbeat`        | opaque                 |
//! | `error`            | [`ServerError`]        |
//!
//! Keys outside this table are still valid topics; [`Topic::Other`] carries
//! them through unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Progress of every download.
pub const PROGRESS: &str = "progress";
/// Per-download log line prefix.
pub const LOG: &str = "log";
/// System resource snapshot.
pub const STATUS: &str = "status";
/// Server liveness beacon.
pub const HEARTBEAT: &str = "heartbeat";
/// Server-side error report.
pub const ERROR: &str = "error";

/// A parsed topic key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `progress` (all downloads) or `progress:<id>`.
    Progress(Option<u64>),
    /// `log:<id>`.
    Log(u64),
    /// `status`.
    Status,
    /// `heartbeat`.
    Heartbeat,
    /// `error`.
    Error,
    /// Any other key.
    Other(String),
}

impl Topic {
    /// Progress topic for one download.
    #[must_use]
    pub fn progress(download_id: u64) -> Self {
        Self::Progress(Some(download_id))
    }

    /// Log topic for one download.
    #[must_use]
    pub fn log(download_id: u64) -> Self {
        Self::Log(download_id)
    }

    /// Wire key for this topic.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress(None) => f.write_str(PROGRESS),
            Self::Progress(Some(id)) => write!(f, "{PROGRESS}:{id}"),
            Self::Log(id) => write!(f, "{LOG}:{id}"),
            Self::Status => f.write_str(STATUS),
            Self::Heartbeat => f.write_str(HEARTBEAT),
            Self::Error => f.write_str(ERROR),
            Self::Other(key) => f.write_str(key),
        }
    }
}

impl FromStr for Topic {
    type Err = std::convert::Infallible;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let topic = match key.split_once(':') {
            None => match key {
                PROGRESS => Self::Progress(None),
                STATUS => Self::Status,
                HEARTBEAT => Self::Heartbeat,
                ERROR => Self::Error,
                other => Self::Other(other.to_string()),
            },
            Some((PROGRESS, id)) => id
                .parse()
                .map_or_else(|_| Self::Other(key.to_string()), |id| Self::Progress(Some(id))),
            Some((LOG, id)) => id
                .parse()
                .map_or_else(|_| Self::Other(key.to_string()), Self::Log),
            Some(_) => Self::Other(key.to_string()),
        };
        Ok(topic)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.key()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a download.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Waiting in the queue.
    Queued,
    /// Transferring.
    Downloading,
    /// Finished successfully.
    Completed,
    /// Stopped with an error.
    Failed,
    /// Paused by the user.
    Paused,
    /// Cancelled by the user.
    Cancelled,
}

impl DownloadStatus {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of download source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadType {
    /// `BitTorrent` magnet or `.torrent`.
    Torrent,
    /// Usenet NZB.
    Nzb,
    /// Plain HTTP(S) URL.
    Direct,
}

/// Progress update for one download.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Download id.
    pub id: u64,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Current status.
    pub status: DownloadStatus,
    /// Percent complete, 0–100.
    pub progress: f64,
    /// Transfer rate in MB/s.
    #[serde(default)]
    pub speed: f64,
    /// Human-readable time remaining.
    #[serde(default)]
    pub eta: String,
    /// Source kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_type: Option<DownloadType>,
    /// Failure detail for failed downloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DownloadProgress {
    /// Whether the download will not make further progress.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }
}

/// One log line emitted while processing a download.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLogLine {
    /// Download the line belongs to.
    pub download_id: u64,
    /// Formatted message.
    pub message: String,
    /// Level name (`INFO`, `WARNING`, ...).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// ISO 8601 timestamp.
    #[serde(default)]
    pub timestamp: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

/// System resource snapshot published on `status`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// CPU usage percent.
    #[serde(default)]
    pub cpu_usage: f64,
    /// Memory usage percent.
    #[serde(default)]
    pub memory_usage: f64,
    /// Disk usage percent.
    #[serde(default)]
    pub disk_usage: f64,
}

/// Error report published on `error`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Human-readable message.
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topic_keys() {
        assert_eq!(Topic::Progress(None).key(), "progress");
        assert_eq!(Topic::progress(42).key(), "progress:42");
        assert_eq!(Topic::log(7).key(), "log:7");
        assert_eq!(Topic::Status.key(), "status");
        assert_eq!(Topic::Other("queue".into()).key(), "queue");
    }

    #[test]
    fn topic_parse_known_keys() {
        assert_eq!("progress".parse::<Topic>().unwrap(), Topic::Progress(None));
        assert_eq!("progress:3".parse::<Topic>().unwrap(), Topic::progress(3));
        assert_eq!("log:11".parse::<Topic>().unwrap(), Topic::log(11));
        assert_eq!("heartbeat".parse::<Topic>().unwrap(), Topic::Heartbeat);
        assert_eq!("error".parse::<Topic>().unwrap(), Topic::Error);
    }

    #[test]
    fn topic_parse_falls_back_to_other() {
        assert_eq!(
            "log:abc".parse::<Topic>().unwrap(),
            Topic::Other("log:abc".into())
        );
        assert_eq!(
            "tags:1".parse::<Topic>().unwrap(),
            Topic::Other("tags:1".into())
        );
    }

    #[test]
    fn topic_display_parse_agree() {
        for topic in [
            Topic::Progress(None),
            Topic::progress(9),
            Topic::log(9),
            Topic::Status,
            Topic::Heartbeat,
            Topic::Error,
        ] {
            assert_eq!(topic.key().parse::<Topic>().unwrap(), topic);
        }
    }

    #[test]
    fn progress_payload_from_server_shape() {
        let progress: DownloadProgress = serde_json::from_value(json!({
            "id": 5,
            "status": "downloading",
            "progress": 50.0,
            "speed": 1.5,
            "eta": "2m"
        }))
        .unwrap();
        assert_eq!(progress.id, 5);
        assert_eq!(progress.status, DownloadStatus::Downloading);
        assert!(!progress.is_finished());
        assert!(progress.name.is_none());
    }

    #[test]
    fn progress_finished_statuses() {
        let mut progress: DownloadProgress = serde_json::from_value(json!({
            "id": 1, "status": "completed", "progress": 100.0
        }))
        .unwrap();
        assert!(progress.is_finished());
        progress.status = DownloadStatus::Paused;
        assert!(!progress.is_finished());
    }

    #[test]
    fn status_display_matches_wire_name() {
        for status in [
            DownloadStatus::Queued,
            DownloadStatus::Downloading,
            DownloadStatus::Failed,
            DownloadStatus::Cancelled,
        ] {
            assert_eq!(json!(status), json!(status.to_string()));
        }
    }

    #[test]
    fn log_line_defaults() {
        let line: DownloadLogLine =
            serde_json::from_value(json!({"download_id": 2, "message": "segment 4 ok"})).unwrap();
        assert_eq!(line.level, "INFO");
        assert!(line.timestamp.is_empty());
    }

    #[test]
    fn system_status_fields() {
        let status: SystemStatus = serde_json::from_value(json!({
            "cpu_usage": 12.5, "memory_usage": 40.0, "disk_usage": 71.0
        }))
        .unwrap();
        assert!((status.disk_usage - 71.0).abs() < f64::EPSILON);
    }
}

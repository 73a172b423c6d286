//! Settings error types.

use thiserror::Error;

/// Why `~/.dlstream/settings.json` could not be turned into usable settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON, or a field has the wrong type.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value failed validation, such as a `channel.url` that is not
    /// `ws://`/`wss://` or a `channel.jitterFactor` outside `0.0..=1.0`.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result alias used by the loader and validators.
pub type Result<T> = std::result::Result<T, SettingsError>;

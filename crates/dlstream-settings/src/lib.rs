//! # dlstream-settings
//!
//! Layered configuration for the channel client: compiled defaults, then
//! `~/.dlstream/settings.json`, then `DLSTREAM_*` environment variables.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{ChannelSettings, DlstreamSettings, LoggingSettings, PolicyKind};

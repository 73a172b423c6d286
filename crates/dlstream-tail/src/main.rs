//! # dlstream-tail
//!
//! Connects to the download manager's live channel, subscribes to the given
//! topics and prints every payload to stdout, one line each.

#![deny(unsafe_code)]

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dlstream_client::ChannelBuilder;
use dlstream_core::Topic;
use dlstream_core::topics::{DownloadLogLine, DownloadProgress, SystemStatus};
use dlstream_logging::{HttpLogSink, HttpSinkConfig, LogLevel};
use dlstream_settings::{DlstreamSettings, LoggingSettings};
use serde_json::Value;
use tokio::sync::mpsc;

/// Tail the download manager's live channel.
#[derive(Parser, Debug)]
#[command(name = "dlstream-tail", about = "Print live download-manager updates")]
struct Cli {
    /// Topics to subscribe to, e.g. `progress`, `progress:42`, `log:42`, `status`.
    #[arg(default_values = ["progress", "status"])]
    topics: Vec<String>,

    /// Channel URL (overrides settings).
    #[arg(long)]
    url: Option<String>,

    /// Settings file (default `~/.dlstream/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Write logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Print payload JSON as received instead of formatted lines.
    #[arg(long)]
    raw: bool,

    /// Exit with an error once the channel gives up reconnecting.
    #[arg(long)]
    exit_on_close: bool,
}

impl Cli {
    /// Command-line flags win over file and environment settings.
    fn apply(&self, settings: &mut DlstreamSettings) {
        if let Some(url) = &self.url {
            settings.channel.url.clone_from(url);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn load_settings(cli: &Cli) -> Result<DlstreamSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(dlstream_settings::settings_path);
    let mut settings = dlstream_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

/// Remote sink configuration, when a collector endpoint is set. The sink
/// forwards nothing below the configured log level.
fn sink_config(logging: &LoggingSettings) -> Option<HttpSinkConfig> {
    let endpoint = logging.endpoint.as_ref()?;
    Some(HttpSinkConfig {
        min_level: LogLevel::from_str_lossy(&logging.level),
        ..HttpSinkConfig::new(endpoint.clone())
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// One output line for a payload. Known topics are formatted, anything else
/// (or a payload that does not match its topic's shape) is printed as JSON.
fn render(topic: &str, data: &Value) -> String {
    let Ok(parsed) = topic.parse::<Topic>();
    let formatted = match parsed {
        Topic::Progress(_) => serde_json::from_value::<DownloadProgress>(data.clone())
            .ok()
            .map(|progress| render_progress(&progress)),
        Topic::Log(_) => serde_json::from_value::<DownloadLogLine>(data.clone())
            .ok()
            .map(|line| format!("[{}] {}", line.level, line.message)),
        Topic::Status => serde_json::from_value::<SystemStatus>(data.clone())
            .ok()
            .map(|status| {
                format!(
                    "cpu {:.1}% mem {:.1}% disk {:.1}%",
                    status.cpu_usage, status.memory_usage, status.disk_usage
                )
            }),
        _ => None,
    };
    format!("{topic} {}", formatted.unwrap_or_else(|| data.to_string()))
}

fn render_progress(progress: &DownloadProgress) -> String {
    let mut line = format!(
        "#{} {} {:.1}%",
        progress.id, progress.status, progress.progress
    );
    if let Some(name) = &progress.name {
        line = format!("{line} {name}");
    }
    if !progress.is_finished() {
        line = format!("{line} {:.2} MB/s", progress.speed);
        if !progress.eta.is_empty() {
            line = format!("{line} eta {}", progress.eta);
        }
    }
    if let Some(error) = &progress.error_message {
        line = format!("{line} ({error})");
    }
    line
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    if settings.logging.json {
        dlstream_logging::init_json_subscriber(&settings.logging.level);
    } else {
        dlstream_logging::init_subscriber(&settings.logging.level);
    }

    let mut builder = ChannelBuilder::from_settings(&settings.channel).autostart(false);
    let sink = sink_config(&settings.logging).map(HttpLogSink::new);
    let flush_task = sink.clone().map(dlstream_logging::spawn_flush_task);
    if let Some(sink) = &sink {
        builder = builder.log_sink(sink.clone());
    }
    let channel = builder.build().context("Failed to start channel")?;

    let (tx, mut payloads) = mpsc::unbounded_channel::<(String, Value)>();
    for topic in &cli.topics {
        let key = topic.clone();
        let tx = tx.clone();
        let _subscription = channel.subscribe(topic.clone(), move |data| {
            let _ = tx.send((key.clone(), data.clone()));
        });
    }
    drop(tx);

    tracing::info!(url = channel.url(), topics = ?cli.topics, "tailing channel");
    channel.connect();

    let mut states = channel.watch_state();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            Some((topic, data)) = payloads.recv() => {
                let line = if cli.raw { format!("{topic} {data}") } else { render(&topic, &data) };
                if writeln!(std::io::stdout(), "{line}").is_err() {
                    break Ok(());
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *states.borrow_and_update();
                tracing::info!(%state, "connection state");
                if cli.exit_on_close && state.is_terminal() {
                    break Err(anyhow!("channel closed after exhausting reconnect attempts"));
                }
            }
            result = &mut shutdown => {
                if let Err(error) = result {
                    tracing::warn!(%error, "failed to listen for ctrl-c");
                }
                tracing::info!("shutting down");
                break Ok(());
            }
        }
    };

    channel.disconnect();
    if let Some(sink) = sink {
        if let Err(error) = sink.flush().await {
            tracing::warn!(%error, "final log flush failed");
        }
    }
    if let Some(task) = flush_task {
        task.abort();
    }

    outcome
}

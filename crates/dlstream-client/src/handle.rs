//! Public facade: [`ChannelBuilder`], [`ChannelHandle`], [`SubscriptionHandle`].
//!
//! The handle holds no connection logic. Each call enqueues a command for the
//! actor and returns immediately; results show up on the state watch and in
//! subscription handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use dlstream_core::reconnect::FixedInterval;
use dlstream_core::{ConnectionState, Envelope, ReconnectPolicy, SubscriptionId};
use dlstream_logging::LogSink;
use dlstream_settings::ChannelSettings;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, warn};

use crate::actor::{ActorConfig, Command, ConnectionActor};
use crate::errors::ChannelError;
use crate::transport::Transport;
use crate::ws::WsTransport;

/// Default inbound frame cap (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1_048_576;

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Assembles a channel and spawns its connection actor.
pub struct ChannelBuilder {
    url: String,
    policy: Box<dyn ReconnectPolicy>,
    transport: Option<Arc<dyn Transport>>,
    sink: Option<Arc<dyn LogSink>>,
    autostart: bool,
    max_frame_bytes: usize,
    keepalive: Option<Duration>,
}

impl std::fmt::Debug for ChannelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBuilder")
            .field("url", &self.url)
            .field("policy", &self.policy)
            .field("autostart", &self.autostart)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .field("keepalive", &self.keepalive)
            .finish_non_exhaustive()
    }
}

impl ChannelBuilder {
    /// Start from defaults: fixed 3s interval, 5 attempts, autostart,
    /// WebSocket transport without keepalive.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: Box::new(FixedInterval::default()),
            transport: None,
            sink: None,
            autostart: true,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            keepalive: None,
        }
    }

    /// Start from loaded settings.
    pub fn from_settings(settings: &ChannelSettings) -> Self {
        Self {
            url: settings.url.clone(),
            policy: settings.build_policy(),
            transport: None,
            sink: None,
            autostart: settings.autostart,
            max_frame_bytes: settings.max_frame_bytes,
            keepalive: settings.keepalive(),
        }
    }

    /// Reconnect policy.
    #[must_use]
    pub fn policy(mut self, policy: impl ReconnectPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Transport used to open sockets. Defaults to [`WsTransport`].
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sink for terminal connection loss and malformed frames.
    #[must_use]
    pub fn log_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Connect immediately on `build()`.
    #[must_use]
    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Drop inbound frames larger than this; 0 disables the check.
    #[must_use]
    pub fn max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Ping interval for the default transport.
    #[must_use]
    pub fn keepalive(mut self, interval: Option<Duration>) -> Self {
        self.keepalive = interval;
        self
    }

    /// Validate the URL and spawn the connection actor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<ChannelHandle, ChannelError> {
        validate_url(&self.url)?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ChannelError::NoRuntime);
        }

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WsTransport::new(self.keepalive)));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let attempts = Arc::new(AtomicU32::new(0));

        let actor = ConnectionActor::new(
            ActorConfig {
                url: self.url.clone(),
                transport,
                policy: self.policy,
                sink: self.sink,
                max_frame_bytes: self.max_frame_bytes,
            },
            state_tx,
            Arc::clone(&attempts),
        );
        let _ = tokio::spawn(actor.run(command_rx));

        let handle = ChannelHandle {
            inner: Arc::new(Shared {
                url: self.url,
                commands,
                state: state_rx,
                attempts,
                next_id: AtomicU64::new(1),
            }),
        };
        if self.autostart {
            handle.connect();
        }
        Ok(handle)
    }
}

fn validate_url(url: &str) -> Result<(), ChannelError> {
    let invalid = |reason: String| ChannelError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let request = url
        .into_client_request()
        .map_err(|e| invalid(e.to_string()))?;
    match request.uri().scheme_str() {
        Some("ws" | "wss") => Ok(()),
        other => Err(invalid(format!(
            "scheme must be ws or wss, got {}",
            other.unwrap_or("none")
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

struct Shared {
    url: String,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    attempts: Arc<AtomicU32>,
    next_id: AtomicU64,
}

/// Cloneable handle to one multiplexed channel.
///
/// Dropping the last clone disconnects and discards every subscription.
#[derive(Clone)]
pub struct ChannelHandle {
    inner: Arc<Shared>,
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .finish()
    }
}

impl ChannelHandle {
    /// Endpoint this channel connects to.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Open the connection. No-op while connecting or open.
    pub fn connect(&self) {
        self.fire(Command::Connect);
    }

    /// Close the connection, cancel any pending reconnect and go idle.
    pub fn disconnect(&self) {
        self.fire(Command::Disconnect);
    }

    /// Write an envelope if the connection is open; otherwise it is dropped
    /// with a warning.
    pub fn send(&self, envelope: Envelope) {
        self.fire(Command::Send(envelope));
    }

    /// Register `handler` for `topic`. Payloads (`data`) arrive in order.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        handler: impl FnMut(&Value) + Send + 'static,
    ) -> SubscriptionHandle {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let topic = topic.into();
        debug!(subscription = %id, topic = %topic, "subscribe");
        self.fire(Command::Subscribe {
            id,
            topic: topic.clone(),
            handler: Box::new(handler),
        });
        SubscriptionHandle {
            id,
            topic,
            commands: self.inner.commands.downgrade(),
        }
    }

    /// Like [`Self::subscribe`], but payloads arrive on a channel.
    ///
    /// The receiver ends once the subscription is removed and the actor has
    /// dropped the sender.
    pub fn subscribe_channel(
        &self,
        topic: impl Into<String>,
    ) -> (SubscriptionHandle, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(topic, move |data| {
            let _ = tx.send(data.clone());
        });
        (handle, rx)
    }

    /// Like [`Self::subscribe`], deserializing each payload as `T`.
    ///
    /// Payloads that do not match `T` are dropped with a warning.
    pub fn subscribe_typed<T, F>(
        &self,
        topic: impl Into<String>,
        mut handler: F,
    ) -> SubscriptionHandle
    where
        T: DeserializeOwned + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let topic = topic.into();
        let key = topic.clone();
        self.subscribe(topic, move |data| match T::deserialize(data) {
            Ok(value) => handler(value),
            Err(error) => warn!(topic = %key, %error, "payload did not match subscriber type"),
        })
    }

    /// Remove a subscription. No-op if it was already removed.
    #[allow(clippy::needless_pass_by_value)]
    pub fn unsubscribe(&self, subscription: SubscriptionHandle) {
        debug!(subscription = %subscription.id, topic = %subscription.topic, "unsubscribe");
        self.fire(Command::Unsubscribe {
            id: subscription.id,
        });
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.clone()
    }

    /// Wait until the state satisfies `predicate`, returning that state.
    pub async fn wait_for_state(
        &self,
        mut predicate: impl FnMut(ConnectionState) -> bool,
    ) -> Result<ConnectionState, ChannelError> {
        let mut state = self.watch_state();
        state
            .wait_for(|s| predicate(*s))
            .await
            .map(|s| *s)
            .map_err(|_| ChannelError::ActorGone)
    }

    /// Reconnects scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::Relaxed)
    }

    fn command(&self, command: Command) -> Result<(), ChannelError> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| ChannelError::ActorGone)
    }

    fn fire(&self, command: Command) {
        if let Err(error) = self.command(command) {
            warn!(%error, "channel command dropped");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription handle
// ─────────────────────────────────────────────────────────────────────────────

/// Capability to remove one subscription.
///
/// Dropping it leaves the subscription in place. It does not keep the channel
/// alive.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    topic: String,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl SubscriptionHandle {
    /// Subscription identity.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Topic key this subscription listens to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Remove the subscription. No-op if the channel is gone.
    pub fn unsubscribe(self) {
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::Unsubscribe { id: self.id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn validate_url_accepts_ws_and_wss() {
        assert!(validate_url("ws://localhost:8000/api/ws").is_ok());
        assert!(validate_url("wss://nas.lan/api/ws").is_ok());
    }

    #[test]
    fn validate_url_rejects_other_schemes() {
        assert_matches!(
            validate_url("http://localhost:8000/api/ws"),
            Err(ChannelError::InvalidUrl { reason, .. }) if reason.contains("scheme")
        );
        assert_matches!(validate_url("not a url"), Err(ChannelError::InvalidUrl { .. }));
    }

    #[test]
    fn build_outside_runtime_fails() {
        let result = ChannelBuilder::new("ws://localhost:8000/api/ws").build();
        assert_matches!(result, Err(ChannelError::NoRuntime));
    }

    #[test]
    fn from_settings_copies_fields() {
        let settings = ChannelSettings {
            autostart: false,
            max_frame_bytes: 64,
            keepalive_interval_ms: 0,
            ..ChannelSettings::default()
        };
        let builder = ChannelBuilder::from_settings(&settings);
        assert_eq!(builder.url, settings.url);
        assert!(!builder.autostart);
        assert_eq!(builder.max_frame_bytes, 64);
        assert_eq!(builder.keepalive, None);
    }
}

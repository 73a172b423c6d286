//! Connection actor.
//!
//! One task owns the [`ConnectionMachine`], the [`SubscriptionRegistry`], the
//! live [`Socket`] and the reconnect timer. It waits on four sources at once:
//!
//! 1. commands from [`crate::ChannelHandle`]s
//! 2. results of in-flight connect attempts
//! 3. the reconnect timer
//! 4. events from the live socket
//!
//! and handles them one at a time, so nothing it owns needs a lock. Every
//! state change goes through [`ConnectionMachine::transition`]; the actor only
//! executes the returned effects.
//!
//! Replay runs while the `Opened` event is being applied, before the new
//! socket is polled, so no frame of a fresh connection is dispatched ahead of
//! the `subscribe` frames it depends on.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dlstream_core::topics;
use dlstream_core::{
    ConnectionMachine, ConnectionState, ControlFrame, Effect, Envelope, Epoch, Event, Handler,
    ReconnectPolicy, SubscriptionId, SubscriptionRegistry, TimerId, decode_frame_limited,
};
use dlstream_logging::{LogLevel, LogSink};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::TransportError;
use crate::transport::{Socket, SocketEvent, Transport};

/// Longest frame excerpt attached to a malformed-frame report.
const PREVIEW_CHARS: usize = 120;

/// Requests from handles to the actor.
pub(crate) enum Command {
    Connect,
    Disconnect,
    Send(Envelope),
    Subscribe {
        id: SubscriptionId,
        topic: String,
        handler: Handler,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
}

/// Everything the actor needs besides its channels.
pub(crate) struct ActorConfig {
    pub url: String,
    pub transport: Arc<dyn Transport>,
    pub policy: Box<dyn ReconnectPolicy>,
    pub sink: Option<Arc<dyn LogSink>>,
    pub max_frame_bytes: usize,
}

type ConnectResult = (Epoch, Result<Socket, TransportError>);

pub(crate) struct ConnectionActor {
    url: String,
    transport: Arc<dyn Transport>,
    sink: Option<Arc<dyn LogSink>>,
    max_frame_bytes: usize,

    machine: ConnectionMachine,
    registry: SubscriptionRegistry,

    socket: Option<(Epoch, Socket)>,
    connecting: Option<(Epoch, JoinHandle<()>)>,
    connect_tx: mpsc::UnboundedSender<ConnectResult>,
    connect_rx: mpsc::UnboundedReceiver<ConnectResult>,
    timer: Option<(TimerId, Pin<Box<Sleep>>)>,

    state_tx: watch::Sender<ConnectionState>,
    attempts: Arc<AtomicU32>,
}

impl ConnectionActor {
    pub(crate) fn new(
        config: ActorConfig,
        state_tx: watch::Sender<ConnectionState>,
        attempts: Arc<AtomicU32>,
    ) -> Self {
        let (connect_tx, connect_rx) = mpsc::unbounded_channel();
        Self {
            url: config.url,
            transport: config.transport,
            sink: config.sink,
            max_frame_bytes: config.max_frame_bytes,
            machine: ConnectionMachine::new(config.policy),
            registry: SubscriptionRegistry::new(),
            socket: None,
            connecting: None,
            connect_tx,
            connect_rx,
            timer: None,
            state_tx,
            attempts,
        }
    }

    /// Run until every command sender is gone, then disconnect.
    #[instrument(skip_all, fields(url = %self.url))]
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some((epoch, result)) = self.connect_rx.recv() => {
                    self.handle_connect_result(epoch, result);
                }
                timer = wait_timer(&mut self.timer) => {
                    self.timer = None;
                    self.apply(Event::TimerFired { timer });
                }
                (epoch, event) = recv_socket(&mut self.socket) => {
                    self.handle_socket_event(epoch, event);
                }
            }
        }

        debug!("all channel handles dropped, shutting down");
        self.apply(Event::Disconnect);
        self.registry.clear();
    }

    // ── Inputs ──────────────────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.apply(Event::Connect),
            Command::Disconnect => self.apply(Event::Disconnect),
            Command::Send(envelope) => self.send_envelope(&envelope),
            Command::Subscribe { id, topic, handler } => {
                if let Some(frame) = self.registry.insert(id, topic, handler) {
                    self.send_control_if_open(&frame);
                }
            }
            Command::Unsubscribe { id } => {
                if let Some(frame) = self.registry.remove(id) {
                    self.send_control_if_open(&frame);
                }
            }
        }
    }

    fn handle_connect_result(&mut self, epoch: Epoch, result: Result<Socket, TransportError>) {
        if self.connecting.as_ref().is_some_and(|(e, _)| *e == epoch) {
            self.connecting = None;
        }
        match result {
            Ok(socket) => {
                let current = self.machine.live_epoch() == Some(epoch)
                    && self.machine.state() == ConnectionState::Connecting;
                if current {
                    self.socket = Some((epoch, socket));
                    self.apply(Event::Opened { epoch });
                } else {
                    debug!(epoch, "discarding socket from abandoned attempt");
                    socket.close();
                }
            }
            Err(error) => {
                info!(epoch, %error, "connect attempt failed");
                self.apply(Event::Errored {
                    epoch,
                    message: error.to_string(),
                });
                self.apply(Event::Closed {
                    epoch,
                    reason: None,
                });
            }
        }
    }

    fn handle_socket_event(&mut self, epoch: Epoch, event: SocketEvent) {
        match event {
            SocketEvent::Frame(text) => self.dispatch_frame(&text),
            SocketEvent::Error(message) => {
                info!(epoch, error = %message, "socket error");
                self.apply(Event::Errored { epoch, message });
            }
            SocketEvent::Closed(reason) => {
                info!(epoch, reason = reason.as_deref().unwrap_or(""), "socket closed");
                if self.socket.as_ref().is_some_and(|(e, _)| *e == epoch) {
                    self.socket = None;
                }
                self.apply(Event::Closed { epoch, reason });
            }
        }
    }

    fn dispatch_frame(&mut self, text: &str) {
        let envelope = match decode_frame_limited(text, self.max_frame_bytes) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(reason = error.reason(), %error, "dropping malformed frame");
                self.report(
                    LogLevel::Warn,
                    "malformed frame dropped",
                    json!({
                        "url": self.url,
                        "reason": error.reason(),
                        "error": error.to_string(),
                        "preview": preview(text),
                    }),
                );
                return;
            }
        };

        if self.registry.dispatch(&envelope) > 0 {
            return;
        }
        if envelope.kind == topics::ERROR {
            warn!(data = %envelope.data, "server reported an error with no subscriber");
        } else {
            debug!(topic = %envelope.kind, "no subscriber for topic, dropping frame");
        }
    }

    // ── State machine ───────────────────────────────────────────────────

    fn apply(&mut self, event: Event) {
        for effect in self.machine.transition(event) {
            self.execute(effect);
        }
        self.attempts
            .store(self.machine.reconnect_attempts(), Ordering::Relaxed);
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::CancelTimer { timer } => {
                if self.timer.as_ref().is_some_and(|(id, _)| *id == timer) {
                    debug!(timer, "reconnect timer cancelled");
                    self.timer = None;
                }
            }
            Effect::OpenSocket { epoch } => self.open_socket(epoch),
            Effect::CloseSocket { epoch } => {
                if let Some((_, socket)) = self.socket.take_if(|(e, _)| *e == epoch) {
                    socket.close();
                }
                if let Some((_, task)) = self.connecting.take_if(|(e, _)| *e == epoch) {
                    task.abort();
                }
            }
            Effect::ScheduleReconnect { timer, delay } => {
                info!(
                    attempt = self.machine.reconnect_attempts(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "reconnect scheduled"
                );
                self.timer = Some((timer, Box::pin(tokio::time::sleep(delay))));
            }
            Effect::StateChanged(state) => {
                debug!(%state, "connection state changed");
                let _ = self.state_tx.send_replace(state);
            }
            Effect::ReplaySubscriptions => {
                let frames = self.registry.replay_subscriptions();
                info!(topics = frames.len(), "connection open, replaying subscriptions");
                for frame in &frames {
                    self.send_control(frame);
                }
            }
            Effect::ReconnectExhausted {
                attempts,
                last_error,
            } => {
                error!(
                    attempts,
                    last_error = last_error.as_deref().unwrap_or(""),
                    "reconnect attempts exhausted, connection closed"
                );
                self.report(
                    LogLevel::Error,
                    "connection lost: reconnect attempts exhausted",
                    json!({
                        "url": self.url,
                        "attempts": attempts,
                        "lastError": last_error,
                    }),
                );
            }
        }
    }

    fn open_socket(&mut self, epoch: Epoch) {
        debug!(epoch, "opening socket");
        let transport = Arc::clone(&self.transport);
        let url = self.url.clone();
        let results = self.connect_tx.clone();
        let task = tokio::spawn(async move {
            let result = transport.connect(&url).await;
            let _ = results.send((epoch, result));
        });
        if let Some((_, stale)) = self.connecting.replace((epoch, task)) {
            stale.abort();
        }
    }

    // ── Outbound ────────────────────────────────────────────────────────

    fn send_envelope(&self, envelope: &Envelope) {
        let state = self.machine.state();
        if !state.is_open() {
            warn!(kind = %envelope.kind, %state, "send while not open, dropping");
            return;
        }
        match envelope.encode() {
            Ok(text) => self.write(text),
            Err(error) => warn!(kind = %envelope.kind, %error, "failed to encode envelope"),
        }
    }

    fn send_control_if_open(&self, frame: &ControlFrame) {
        if self.machine.state().is_open() {
            self.send_control(frame);
        } else {
            debug!(key = frame.key(), "not open, control frame deferred to replay");
        }
    }

    fn send_control(&self, frame: &ControlFrame) {
        match frame.encode() {
            Ok(text) => self.write(text),
            Err(error) => warn!(key = frame.key(), %error, "failed to encode control frame"),
        }
    }

    fn write(&self, text: String) {
        match &self.socket {
            Some((epoch, socket)) => {
                if !socket.send_text(text) {
                    debug!(epoch, "socket writer gone, frame dropped");
                }
            }
            None => debug!("no live socket, frame dropped"),
        }
    }

    fn report(&self, level: LogLevel, message: &str, details: Value) {
        if let Some(sink) = &self.sink {
            sink.log(level, message, details);
        }
    }
}

async fn wait_timer(timer: &mut Option<(TimerId, Pin<Box<Sleep>>)>) -> TimerId {
    match timer {
        Some((id, sleep)) => {
            sleep.as_mut().await;
            *id
        }
        None => std::future::pending().await,
    }
}

async fn recv_socket(socket: &mut Option<(Epoch, Socket)>) -> (Epoch, SocketEvent) {
    match socket {
        Some((epoch, socket)) => {
            let event = socket
                .recv()
                .await
                .unwrap_or_else(|| SocketEvent::Closed(Some("transport task ended".to_string())));
            (*epoch, event)
        }
        None => std::future::pending().await,
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

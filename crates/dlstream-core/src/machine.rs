//! Connection state machine.
//!
//! [`ConnectionMachine::transition`] is the single place where connection
//! state changes. It consumes an [`Event`] (user command, socket callback or
//! timer firing) and returns the ordered list of [`Effect`]s the driver must
//! carry out. The machine never performs I/O, so every transition can be
//! exercised without a socket or a clock.
//!
//! ```text
//!            connect                open
//!   Idle ───────────▶ Connecting ─────────▶ Open
//!    ▲                  ▲    │ close          │ close
//!    │ disconnect       │    ▼                ▼
//!    │ (from any)   timer│  policy ──delay──▶ Reconnecting
//!    │                  └──────────────────────┘
//!    │                       policy ──stop──▶ Closed (terminal)
//! ```
//!
//! Socket events carry the [`Epoch`] of the socket they came from and timer
//! firings carry their [`TimerId`]; anything that does not match the socket or
//! timer the machine currently owns is ignored.

use std::time::Duration;

use crate::reconnect::ReconnectPolicy;
use crate::state::ConnectionState;

/// Identifies one physical socket. Increases with every open attempt.
pub type Epoch = u64;
/// Identifies one scheduled reconnect timer.
pub type TimerId = u64;

/// Inputs to the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Explicit `connect()` from a consumer.
    Connect,
    /// Explicit `disconnect()` from a consumer.
    Disconnect,
    /// The socket for `epoch` finished its handshake.
    Opened {
        /// Socket epoch.
        epoch: Epoch,
    },
    /// The socket for `epoch` reported an error. Always followed by `Closed`.
    Errored {
        /// Socket epoch.
        epoch: Epoch,
        /// Error description.
        message: String,
    },
    /// The socket for `epoch` closed, or failed to open.
    Closed {
        /// Socket epoch.
        epoch: Epoch,
        /// Close reason, if the peer sent one.
        reason: Option<String>,
    },
    /// A reconnect timer elapsed.
    TimerFired {
        /// Timer that fired.
        timer: TimerId,
    },
}

/// Actions the driver performs, in order, after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Cancel a previously scheduled reconnect timer.
    CancelTimer {
        /// Timer to cancel.
        timer: TimerId,
    },
    /// Start opening a socket to the configured URL.
    OpenSocket {
        /// Epoch the new socket belongs to.
        epoch: Epoch,
    },
    /// Close (or abandon, if still opening) the socket for `epoch`.
    CloseSocket {
        /// Socket epoch.
        epoch: Epoch,
    },
    /// Arm a reconnect timer.
    ScheduleReconnect {
        /// Timer identity reported back in [`Event::TimerFired`].
        timer: TimerId,
        /// Wait before firing.
        delay: Duration,
    },
    /// Publish a new observable state.
    StateChanged(ConnectionState),
    /// Re-send `subscribe` for every active topic.
    ReplaySubscriptions,
    /// The policy refused another attempt; report terminal loss.
    ReconnectExhausted {
        /// Reconnects made since the last successful open.
        attempts: u32,
        /// Last transport error or close reason seen.
        last_error: Option<String>,
    },
}

/// Owned connection state driven exclusively through [`Self::transition`].
#[derive(Debug)]
pub struct ConnectionMachine {
    policy: Box<dyn ReconnectPolicy>,
    state: ConnectionState,
    socket: Option<Epoch>,
    last_epoch: Epoch,
    attempts: u32,
    pending_timer: Option<TimerId>,
    last_timer: TimerId,
    last_error: Option<String>,
}

impl ConnectionMachine {
    /// Create an idle machine with the given reconnect policy.
    #[must_use]
    pub fn new(policy: Box<dyn ReconnectPolicy>) -> Self {
        Self {
            policy,
            state: ConnectionState::Idle,
            socket: None,
            last_epoch: 0,
            attempts: 0,
            pending_timer: None,
            last_timer: 0,
            last_error: None,
        }
    }

    /// Current observable state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnects scheduled since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts
    }

    /// Epoch of the socket currently opening or open.
    #[must_use]
    pub fn live_epoch(&self) -> Option<Epoch> {
        self.socket
    }

    /// Reconnect timer currently armed.
    #[must_use]
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.pending_timer
    }

    /// Last error or close reason recorded for the current attempt.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Apply one event and return the effects to execute, in order.
    pub fn transition(&mut self, event: Event) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            Event::Connect => self.on_connect(&mut effects),
            Event::Disconnect => self.on_disconnect(&mut effects),
            Event::Opened { epoch } => self.on_opened(epoch, &mut effects),
            Event::Errored { epoch, message } => {
                if self.socket == Some(epoch) {
                    self.last_error = Some(message);
                }
            }
            Event::Closed { epoch, reason } => self.on_closed(epoch, reason, &mut effects),
            Event::TimerFired { timer } => self.on_timer(timer, &mut effects),
        }
        effects
    }

    fn on_connect(&mut self, effects: &mut Vec<Effect>) {
        if self.state.is_active() {
            return;
        }
        // An explicit connect while waiting on the timer keeps the budget;
        // from Idle or terminal Closed it starts a fresh one.
        if !matches!(self.state, ConnectionState::Reconnecting { .. }) {
            self.attempts = 0;
        }
        self.cancel_timer(effects);
        self.open_socket(effects);
    }

    fn on_disconnect(&mut self, effects: &mut Vec<Effect>) {
        self.cancel_timer(effects);
        if let Some(epoch) = self.socket.take() {
            effects.push(Effect::CloseSocket { epoch });
        }
        self.attempts = 0;
        self.last_error = None;
        self.set_state(ConnectionState::Idle, effects);
    }

    fn on_opened(&mut self, epoch: Epoch, effects: &mut Vec<Effect>) {
        if self.socket != Some(epoch) || self.state != ConnectionState::Connecting {
            return;
        }
        self.attempts = 0;
        self.last_error = None;
        self.set_state(ConnectionState::Open, effects);
        effects.push(Effect::ReplaySubscriptions);
    }

    fn on_closed(&mut self, epoch: Epoch, reason: Option<String>, effects: &mut Vec<Effect>) {
        if self.socket != Some(epoch) {
            return;
        }
        self.socket = None;
        self.last_error = self.last_error.take().or(reason);

        if let Some(delay) = self.policy.next_delay(self.attempts) {
            self.attempts += 1;
            self.cancel_timer(effects);
            self.last_timer += 1;
            let timer = self.last_timer;
            self.pending_timer = Some(timer);
            self.set_state(
                ConnectionState::Reconnecting {
                    attempt: self.attempts,
                },
                effects,
            );
            effects.push(Effect::ScheduleReconnect { timer, delay });
        } else {
            self.set_state(ConnectionState::Closed, effects);
            effects.push(Effect::ReconnectExhausted {
                attempts: self.attempts,
                last_error: self.last_error.clone(),
            });
        }
    }

    fn on_timer(&mut self, timer: TimerId, effects: &mut Vec<Effect>) {
        if self.pending_timer != Some(timer) {
            return;
        }
        self.pending_timer = None;
        if matches!(self.state, ConnectionState::Reconnecting { .. }) {
            self.open_socket(effects);
        }
    }

    fn open_socket(&mut self, effects: &mut Vec<Effect>) {
        self.last_epoch += 1;
        let epoch = self.last_epoch;
        self.socket = Some(epoch);
        self.last_error = None;
        effects.push(Effect::OpenSocket { epoch });
        self.set_state(ConnectionState::Connecting, effects);
    }

    fn cancel_timer(&mut self, effects: &mut Vec<Effect>) {
        if let Some(timer) = self.pending_timer.take() {
            effects.push(Effect::CancelTimer { timer });
        }
    }

    fn set_state(&mut self, state: ConnectionState, effects: &mut Vec<Effect>) {
        if self.state != state {
            self.state = state;
            effects.push(Effect::StateChanged(state));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

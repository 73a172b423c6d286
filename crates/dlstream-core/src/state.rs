//! Observable connection state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection state as seen by consumers.
///
/// `Reconnecting` covers the window between a non-explicit close and the
/// policy timer firing. `Closed` is only ever observed as the terminal state
/// reached after the reconnect policy gave up; leaving it takes an explicit
/// `connect()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ConnectionState {
    /// Never connected, or explicitly disconnected.
    #[default]
    Idle,
    /// A socket is being opened.
    Connecting,
    /// The socket is open and subscriptions have been replayed.
    Open,
    /// Waiting for the policy timer before reconnect number `attempt`.
    Reconnecting {
        /// One-based reconnect attempt being waited on.
        attempt: u32,
    },
    /// Reconnect attempts exhausted.
    Closed,
}

impl ConnectionState {
    /// `Connecting` or `Open`: a `connect()` in this state is a no-op.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Whether the socket is open.
    #[must_use]
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    /// Reconnect attempts are exhausted; only an explicit `connect()` leaves
    /// this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }

    /// Lowercase label for logs and UI binding.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            other => f.write_str(other.as_str()),
        }
    }
}

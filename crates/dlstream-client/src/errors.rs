//! Client error types.

use thiserror::Error;

/// Failure to establish or drive a socket.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The WebSocket handshake failed (DNS, TCP, TLS or HTTP upgrade).
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    /// The peer refused the connection.
    #[error("connection refused: {0}")]
    Refused(String),
}

/// Errors surfaced by [`crate::ChannelBuilder`] and the async helpers on
/// [`crate::ChannelHandle`].
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The URL is not a usable `ws://` or `wss://` endpoint.
    #[error("invalid channel url {url:?}: {reason}")]
    InvalidUrl {
        /// URL as given.
        url: String,
        /// What is wrong with it.
        reason: String,
    },
    /// `build()` was called outside a Tokio runtime.
    #[error("channel must be built inside a tokio runtime")]
    NoRuntime,
    /// The connection actor is no longer running.
    #[error("connection actor has stopped")]
    ActorGone,
}

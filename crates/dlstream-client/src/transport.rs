//! Transport seam.
//!
//! A [`Transport`] opens one [`Socket`] per connection attempt. The socket is
//! a pair of channels to a background task that owns the real connection,
//! so the actor never awaits network I/O directly:
//!
//! - outbound text frames go through an unbounded sender
//! - inbound frames, errors and the final close arrive as [`SocketEvent`]s
//! - cancelling the shutdown token (or dropping the socket) stops the task
//!
//! Every socket reports exactly one [`SocketEvent::Closed`] unless its owner
//! shut it down first.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;

/// Something that happened on an open socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame (or UTF-8 binary frame).
    Frame(String),
    /// A read or write error. A `Closed` follows.
    Error(String),
    /// The socket is gone, with the peer's close reason when it sent one.
    Closed(Option<String>),
}

/// Owner side of an open connection.
#[derive(Debug)]
pub struct Socket {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<SocketEvent>,
    shutdown: CancellationToken,
}

/// Task side of an open connection, held by whatever drives the real I/O.
#[derive(Debug)]
pub struct SocketPeer {
    /// Frames written by the owner.
    pub outbound: mpsc::UnboundedReceiver<String>,
    /// Events for the owner.
    pub events: mpsc::UnboundedSender<SocketEvent>,
    /// Cancelled when the owner closes or drops the socket.
    pub shutdown: CancellationToken,
}

impl Socket {
    /// Create a connected owner/peer pair.
    pub fn pair() -> (Self, SocketPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        (
            Self {
                outbound: out_tx,
                inbound: in_rx,
                shutdown: shutdown.clone(),
            },
            SocketPeer {
                outbound: out_rx,
                events: in_tx,
                shutdown,
            },
        )
    }

    /// Queue a text frame. Returns `false` if the I/O task is gone.
    pub fn send_text(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }

    /// Next event; `None` once the I/O task has exited without a close.
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        self.inbound.recv().await
    }

    /// Ask the I/O task to send a close frame and stop.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Opens sockets to a URL.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a socket. Resolves once the handshake has completed.
    async fn connect(&self, url: &str) -> Result<Socket, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_carries_frames_both_ways() {
        let (mut socket, mut peer) = Socket::pair();
        assert!(socket.send_text("out".into()));
        assert_eq!(peer.outbound.recv().await.as_deref(), Some("out"));

        peer.events.send(SocketEvent::Frame("in".into())).unwrap();
        assert_eq!(socket.recv().await, Some(SocketEvent::Frame("in".into())));
    }

    #[test]
    fn drop_cancels_peer() {
        let (socket, peer) = Socket::pair();
        assert!(!peer.shutdown.is_cancelled());
        drop(socket);
        assert!(peer.shutdown.is_cancelled());
    }

    #[test]
    fn send_after_peer_gone_fails() {
        let (socket, peer) = Socket::pair();
        drop(peer);
        assert!(!socket.send_text("lost".into()));
    }
}

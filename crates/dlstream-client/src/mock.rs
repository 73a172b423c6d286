//! Scriptable in-memory transport for tests.
//!
//! Each `connect` pops the next [`MockOutcome`] (default: accept). Accepted
//! connections hand a [`MockPeer`] to the test through the receiver returned
//! by [`MockTransport::new`], so the test plays the server: it reads what the
//! client wrote and injects frames, errors and closes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::transport::{Socket, SocketEvent, SocketPeer, Transport};

/// What the next `connect` call does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockOutcome {
    /// Complete the handshake.
    Accept,
    /// Fail the handshake with this message.
    Refuse(String),
    /// Never resolve.
    Hang,
}

struct MockInner {
    script: Mutex<VecDeque<MockOutcome>>,
    connects: AtomicUsize,
    peers: mpsc::UnboundedSender<MockPeer>,
}

/// Channel-backed [`Transport`]. Clones share the script and counters.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("connects", &self.connect_count())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Create a transport and the receiver of accepted connections.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::new(MockInner {
                script: Mutex::new(VecDeque::new()),
                connects: AtomicUsize::new(0),
                peers,
            }),
        };
        (transport, rx)
    }

    /// Queue outcomes for upcoming `connect` calls.
    pub fn script(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.inner.script.lock().extend(outcomes);
    }

    /// Number of `connect` calls so far.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str) -> Result<Socket, TransportError> {
        let _ = self.inner.connects.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .inner
            .script
            .lock()
            .pop_front()
            .unwrap_or(MockOutcome::Accept);
        match outcome {
            MockOutcome::Accept => {
                let (socket, peer) = Socket::pair();
                let _ = self.inner.peers.send(MockPeer::from(peer));
                Ok(socket)
            }
            MockOutcome::Refuse(message) => Err(TransportError::Refused(message)),
            MockOutcome::Hang => std::future::pending().await,
        }
    }
}

/// Server side of one accepted mock connection.
#[derive(Debug)]
pub struct MockPeer {
    sent: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<SocketEvent>,
    shutdown: CancellationToken,
}

impl From<SocketPeer> for MockPeer {
    fn from(peer: SocketPeer) -> Self {
        Self {
            sent: peer.outbound,
            events: peer.events,
            shutdown: peer.shutdown,
        }
    }
}

impl MockPeer {
    /// Deliver a text frame to the client.
    pub fn push_frame(&self, text: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Frame(text.into()));
    }

    /// Report a socket error to the client.
    pub fn push_error(&self, message: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Error(message.into()));
    }

    /// Close the connection from the server side.
    pub fn close(&self, reason: Option<&str>) {
        let _ = self
            .events
            .send(SocketEvent::Closed(reason.map(str::to_owned)));
    }

    /// Next frame the client wrote, waiting for it.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Every frame the client has written so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Whether the client closed or dropped its end.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

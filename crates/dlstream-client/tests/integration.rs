//! End-to-end tests against a real WebSocket server on a random local port.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use dlstream_client::{ChannelBuilder, ChannelHandle};
use dlstream_core::{ConnectionState, Envelope, FixedInterval};
use dlstream_logging::{LogLevel, MemorySink};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

// ─────────────────────────────────────────────────────────────────────────────
// Test server
// ─────────────────────────────────────────────────────────────────────────────

/// Frames received by the server, tagged with the 1-based connection number.
type Received = mpsc::UnboundedReceiver<(usize, Value)>;

#[derive(Clone)]
struct ServerState {
    received: mpsc::UnboundedSender<(usize, Value)>,
    kick: broadcast::Sender<()>,
    connections: Arc<AtomicUsize>,
}

struct TestServer {
    url: String,
    received: Received,
    kick: broadcast::Sender<()>,
    _server: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        let (received_tx, received) = mpsc::unbounded_channel();
        let (kick, _) = broadcast::channel(4);
        let state = ServerState {
            received: received_tx,
            kick: kick.clone(),
            connections: Arc::new(AtomicUsize::new(0)),
        };
        let router = Router::new()
            .route("/api/ws", get(ws_handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            url: format!("ws://127.0.0.1:{port}/api/ws"),
            received,
            kick,
            _server: server,
        }
    }

    /// Close every open connection with 1012 (service restart).
    fn kick_all(&self) {
        let _ = self.kick.send(());
    }

    async fn next_received(&mut self) -> (usize, Value) {
        timeout(WAIT, self.received.recv())
            .await
            .expect("server received nothing")
            .unwrap()
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Records every frame. Answers `subscribe` with one envelope on that topic
/// and `echo` with the same payload.
async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    let connection = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let mut kick = state.kick.subscribe();

    loop {
        tokio::select! {
            _ = kick.recv() => {
                let frame = CloseFrame { code: 1012, reason: "restart".into() };
                let _ = socket.send(Message::Close(Some(frame))).await;
                return;
            }
            message = socket.recv() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    _ => return,
                };
                let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                let _ = state.received.send((connection, value.clone()));

                let reply = match value["type"].as_str() {
                    Some("subscribe") => Some(json!({
                        "type": value["key"],
                        "data": { "connection": connection },
                    })),
                    Some("echo") => Some(json!({ "type": "echo", "data": value["data"] })),
                    _ => None,
                };
                if let Some(reply) = reply {
                    let _ = socket.send(Message::Text(reply.to_string().into())).await;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn channel(url: &str, sink: &MemorySink) -> ChannelHandle {
    ChannelBuilder::new(url)
        .policy(FixedInterval::new(5, Duration::from_millis(50)))
        .log_sink(sink.clone())
        .autostart(false)
        .build()
        .unwrap()
}

async fn wait_open(channel: &ChannelHandle) {
    let _ = timeout(WAIT, channel.wait_for_state(ConnectionState::is_open))
        .await
        .expect("channel never opened")
        .unwrap();
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    timeout(WAIT, rx.recv())
        .await
        .expect("no payload delivered")
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_and_receive() {
    let mut server = TestServer::start().await;
    let sink = MemorySink::new();
    let channel = channel(&server.url, &sink);

    let (_sub, mut rx) = channel.subscribe_channel("progress:7");
    channel.connect();
    wait_open(&channel).await;

    assert_eq!(
        server.next_received().await,
        (1, json!({"type": "subscribe", "key": "progress:7"}))
    );
    assert_eq!(recv(&mut rx).await, json!({"connection": 1}));
    assert!(sink.entries().is_empty());
}

#[tokio::test]
async fn server_restart_replays_each_topic_once() {
    let mut server = TestServer::start().await;
    let sink = MemorySink::new();
    let channel = channel(&server.url, &sink);

    let (_a1, mut progress) = channel.subscribe_channel("progress:1");
    let (_a2, _progress_dup) = channel.subscribe_channel("progress:1");
    let (_b, mut logs) = channel.subscribe_channel("log:1");
    channel.connect();
    wait_open(&channel).await;

    let first = [server.next_received().await, server.next_received().await];
    assert_eq!(
        first,
        [
            (1, json!({"type": "subscribe", "key": "progress:1"})),
            (1, json!({"type": "subscribe", "key": "log:1"})),
        ]
    );
    assert_eq!(recv(&mut progress).await["connection"], 1);
    assert_eq!(recv(&mut logs).await["connection"], 1);

    server.kick_all();

    let second = [server.next_received().await, server.next_received().await];
    assert_eq!(
        second,
        [
            (2, json!({"type": "subscribe", "key": "progress:1"})),
            (2, json!({"type": "subscribe", "key": "log:1"})),
        ]
    );
    assert_eq!(recv(&mut progress).await["connection"], 2);
    assert_eq!(recv(&mut logs).await["connection"], 2);
    assert_eq!(channel.state(), ConnectionState::Open);
    assert_eq!(channel.reconnect_attempts(), 0);
}

#[tokio::test]
async fn send_round_trips_through_server() {
    let mut server = TestServer::start().await;
    let sink = MemorySink::new();
    let channel = channel(&server.url, &sink);

    let (_sub, mut echoes) = channel.subscribe_channel("echo");
    channel.connect();
    wait_open(&channel).await;
    let _ = server.next_received().await;
    // subscribe reply on the same topic
    assert_eq!(recv(&mut echoes).await, json!({"connection": 1}));

    channel.send(Envelope::new("echo", json!({"download_id": 9})));
    assert_eq!(
        server.next_received().await,
        (1, json!({"type": "echo", "data": {"download_id": 9}}))
    );
    assert_eq!(recv(&mut echoes).await, json!({"download_id": 9}));
}

#[tokio::test]
async fn unreachable_server_exhausts_policy() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let sink = MemorySink::new();
    let channel = ChannelBuilder::new(format!("ws://127.0.0.1:{port}/api/ws"))
        .policy(FixedInterval::new(2, Duration::from_millis(20)))
        .log_sink(sink.clone())
        .build()
        .unwrap();

    // the channel starts out idle, so wait for the closed state itself
    let state = timeout(WAIT, channel.wait_for_state(|s| s == ConnectionState::Closed))
        .await
        .expect("channel never gave up")
        .unwrap();
    assert_eq!(state, ConnectionState::Closed);
    assert_eq!(channel.reconnect_attempts(), 2);

    let errors = sink.entries();
    assert_eq!(sink.count_at_level(LogLevel::Error), 1);
    assert_eq!(errors[0].details["attempts"], 2);
    assert!(
        errors[0].details["lastError"]
            .as_str()
            .unwrap()
            .contains("handshake")
    );
}

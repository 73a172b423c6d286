//! `tokio-tungstenite` transport.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::errors::TransportError;
use crate::transport::{Socket, SocketEvent, SocketPeer, Transport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport with optional Ping keepalive.
///
/// With keepalive enabled a Ping goes out every interval, and a socket that
/// has received nothing (not even a Pong) for two intervals is reported
/// closed.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport {
    keepalive: Option<Duration>,
}

impl WsTransport {
    /// Create a transport; `None` disables keepalive.
    pub fn new(keepalive: Option<Duration>) -> Self {
        Self { keepalive }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Socket, TransportError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        debug!(url, status = %response.status(), "websocket handshake complete");

        let (socket, peer) = Socket::pair();
        let _ = tokio::spawn(run_socket(stream, peer, self.keepalive));
        Ok(socket)
    }
}

/// Pump frames between the WebSocket and the socket channels until either
/// side goes away.
async fn run_socket(stream: WsStream, peer: SocketPeer, keepalive: Option<Duration>) {
    let SocketPeer {
        mut outbound,
        events,
        shutdown,
    } = peer;
    let (mut sink, mut stream) = stream.split();

    let mut ping = keepalive.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let idle_limit = keepalive.map(|period| period * 2);
    let mut last_seen = Instant::now();

    let reason = loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            text = outbound.recv() => {
                let Some(text) = text else {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                };
                if let Err(error) = sink.send(Message::Text(text.into())).await {
                    let _ = events.send(SocketEvent::Error(error.to_string()));
                    break None;
                }
            }
            () = next_tick(ping.as_mut()) => {
                if idle_limit.is_some_and(|limit| last_seen.elapsed() > limit) {
                    info!("no traffic within keepalive window, dropping socket");
                    break Some("keepalive timeout".to_string());
                }
                if let Err(error) = sink.send(Message::Ping(Default::default())).await {
                    let _ = events.send(SocketEvent::Error(error.to_string()));
                    break None;
                }
            }
            message = stream.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(error)) => {
                        let _ = events.send(SocketEvent::Error(error.to_string()));
                        break None;
                    }
                    None => break None,
                };
                last_seen = Instant::now();
                match message {
                    Message::Text(text) => {
                        let _ = events.send(SocketEvent::Frame(text.as_str().to_owned()));
                    }
                    Message::Binary(data) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            let _ = events.send(SocketEvent::Frame(text.to_owned()));
                        }
                        Err(_) => warn!(len = data.len(), "non-UTF-8 binary frame dropped"),
                    },
                    Message::Close(frame) => break frame.as_ref().map(close_reason),
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                }
            }
        }
    };

    let _ = events.send(SocketEvent::Closed(reason));
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn close_reason(frame: &CloseFrame) -> String {
    let code = u16::from(frame.code);
    if frame.reason.as_str().is_empty() {
        code.to_string()
    } else {
        format!("{code} {}", frame.reason.as_str())
    }
}

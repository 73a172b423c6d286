//! # dlstream-client
//!
//! Reconnecting WebSocket client for the download manager's live channel.
//!
//! One socket carries many topics (`progress:<id>`, `log:<id>`, `status`,
//! ...). [`ChannelHandle`] lets any number of consumers subscribe to topics
//! while a single connection actor owns the socket, reconnects it through a
//! [`ReconnectPolicy`](dlstream_core::ReconnectPolicy) and replays every
//! active subscription each time the socket reopens.
//!
//! ```ignore
//! let channel = ChannelBuilder::new("ws://localhost:8000/api/ws").build()?;
//! let progress = channel.subscribe_typed(Topic::progress(7).key(), |p: DownloadProgress| {
//!     println!("{}%", p.progress);
//! });
//! ```
//!
//! - [`transport`]: the [`Transport`] seam; [`WsTransport`] is the real one,
//!   [`MockTransport`] a scripted one for tests
//! - `actor`: single-owner task driving the connection state machine
//! - [`handle`]: the public facade and builder

#![deny(unsafe_code)]

mod actor;
pub mod errors;
pub mod handle;
pub mod mock;
pub mod transport;
pub mod ws;

pub use errors::{ChannelError, TransportError};
pub use handle::{ChannelBuilder, ChannelHandle, DEFAULT_MAX_FRAME_BYTES, SubscriptionHandle};
pub use mock::{MockOutcome, MockPeer, MockTransport};
pub use transport::{Socket, SocketEvent, SocketPeer, Transport};
pub use ws::WsTransport;

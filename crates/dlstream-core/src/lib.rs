//! # dlstream-core
//!
//! Portable, sync-only building blocks of the download manager's live channel.
//!
//! - **Envelope codec**: [`Envelope`] and [`ControlFrame`] wire types, [`decode_frame`]
//! - **Reconnect policies**: the [`ReconnectPolicy`] seam with [`FixedInterval`]
//!   and [`ExponentialBackoff`]
//! - **Connection state machine**: [`ConnectionMachine`] turns socket, timer and
//!   command events into [`Effect`]s without touching any I/O
//! - **Subscription registry**: [`SubscriptionRegistry`] fans topic payloads out
//!   to handlers and replays active topics after a reconnect
//! - **Topics**: download-manager topic names and payload types
//!
//! The async driver that owns a real socket lives in `dlstream-client`.

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod machine;
pub mod reconnect;
pub mod registry;
pub mod state;
pub mod topics;

pub use envelope::{ControlFrame, Envelope, decode_frame, decode_frame_limited};
pub use errors::CodecError;
pub use machine::{ConnectionMachine, Effect, Epoch, Event, TimerId};
pub use reconnect::{ExponentialBackoff, FixedInterval, ReconnectPolicy};
pub use registry::{Handler, SubscriptionId, SubscriptionRegistry};
pub use state::ConnectionState;
pub use topics::Topic;

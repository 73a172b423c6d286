//! Topic subscription registry.
//!
//! Maps topic keys to handlers and decides which control frames the
//! connection needs to send. The registry itself never touches a socket: each
//! mutation returns the [`ControlFrame`] that *would* be sent, and the driver
//! decides whether the connection is open enough to send it.
//!
//! Several subscriptions may share a topic key; every one of them receives
//! each payload (fan-out). Server-side membership is tracked per key, not per
//! handler:
//!
//! - the first handler for a key yields a `subscribe` frame
//! - further handlers for an active key yield nothing
//! - removing the last handler for a key yields an `unsubscribe` frame
//!
//! [`SubscriptionRegistry::replay_subscriptions`] re-derives one `subscribe`
//! per active key, in the order the keys first became active, so replay after
//! a reconnect never duplicates or omits a topic.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::Value;
use tracing::{debug, warn};

use crate::envelope::{ControlFrame, Envelope};

/// Callback receiving the `data` of each envelope for its topic.
pub type Handler = Box<dyn FnMut(&Value) + Send + 'static>;

/// Identity of one registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

struct Entry {
    id: SubscriptionId,
    handler: Handler,
}

/// Topic → handlers map with replay support.
#[derive(Default)]
pub struct SubscriptionRegistry {
    topics: HashMap<String, Vec<Entry>>,
    /// Active keys in first-subscribed order.
    order: Vec<String>,
    index: HashMap<SubscriptionId, String>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`.
    ///
    /// Returns the `subscribe` frame when `topic` had no handlers before.
    /// Re-using an id already registered replaces nothing and returns `None`.
    pub fn insert(
        &mut self,
        id: SubscriptionId,
        topic: impl Into<String>,
        handler: Handler,
    ) -> Option<ControlFrame> {
        if self.index.contains_key(&id) {
            warn!(subscription = %id, "duplicate subscription id ignored");
            return None;
        }
        let topic = topic.into();
        let _ = self.index.insert(id, topic.clone());
        let entries = self.topics.entry(topic.clone()).or_default();
        entries.push(Entry { id, handler });
        if entries.len() == 1 {
            self.order.push(topic.clone());
            debug!(topic = %topic, subscription = %id, "topic became active");
            Some(ControlFrame::subscribe(topic))
        } else {
            debug!(
                topic = %topic,
                subscription = %id,
                handlers = entries.len(),
                "handler added to active topic"
            );
            None
        }
    }

    /// Remove the handler registered under `id`.
    ///
    /// Returns the `unsubscribe` frame when that was the topic's last handler.
    /// Unknown or already-removed ids are a no-op.
    pub fn remove(&mut self, id: SubscriptionId) -> Option<ControlFrame> {
        let topic = self.index.remove(&id)?;
        let entries = self.topics.get_mut(&topic)?;
        entries.retain(|e| e.id != id);
        if entries.is_empty() {
            let _ = self.topics.remove(&topic);
            self.order.retain(|t| t != &topic);
            debug!(topic = %topic, subscription = %id, "topic became inactive");
            Some(ControlFrame::unsubscribe(topic))
        } else {
            None
        }
    }

    /// Deliver `envelope.data` to every handler of `envelope.kind`, in
    /// registration order. Returns the number of handlers invoked.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers
    /// still run.
    pub fn dispatch(&mut self, envelope: &Envelope) -> usize {
        let Some(entries) = self.topics.get_mut(&envelope.kind) else {
            return 0;
        };
        for entry in entries.iter_mut() {
            let handler = &mut entry.handler;
            if catch_unwind(AssertUnwindSafe(|| handler(&envelope.data))).is_err() {
                warn!(
                    topic = %envelope.kind,
                    subscription = %entry.id,
                    "subscription handler panicked"
                );
            }
        }
        entries.len()
    }

    /// One `subscribe` frame per active topic, deduplicated, in the order the
    /// topics first became active. Calling it repeatedly yields the same list.
    #[must_use]
    pub fn replay_subscriptions(&self) -> Vec<ControlFrame> {
        self.order
            .iter()
            .map(|topic| ControlFrame::subscribe(topic.as_str()))
            .collect()
    }

    /// Active topic keys in first-subscribed order.
    #[must_use]
    pub fn active_topics(&self) -> &[String] {
        &self.order
    }

    /// Number of handlers registered for `topic`.
    #[must_use]
    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    /// Whether `id` is still registered.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.index.contains_key(&id)
    }

    /// Total number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.topics.clear();
        self.order.clear();
        self.index.clear();
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.order)
            .field("handlers", &self.index.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

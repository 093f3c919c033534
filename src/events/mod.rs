//! Publish-subscribe fan-out (C2, spec.md §4.2). Grounded on the teacher's
//! `main.rs` use of `tokio::sync::broadcast` to fan WS server events out to
//! connected clients — here generalized to one broadcast channel per named
//! topic instead of a single global channel, so per-order topics
//! (`orders/{idOrder}`) don't wake up subscribers of unrelated orders.
//!
//! Publish is never called from inside a Store transaction: engines commit
//! first, then publish (spec.md §4.2). A publish failure (no receivers, or
//! a lagged receiver) is not an error the caller should see — `publish`
//! swallows it after logging, so durable state is never rolled back because
//! a notification didn't land.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event_type: &'static str,
    pub message: String,
    pub data: Value,
    pub timestamp: String,
}

impl Event {
    pub fn new(event_type: &'static str, message: impl Into<String>, data: Value) -> Self {
        Self {
            event_type,
            message: message.into(),
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub struct EventBus {
    topics: RwLock<HashMap<String, broadcast::Sender<Event>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a topic, creating its channel lazily if this is the
    /// first subscriber.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Event> {
        if let Some(tx) = self.topics.read().get(topic) {
            return tx.subscribe();
        }
        let mut topics = self.topics.write();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish to a single topic. A topic with no subscribers is not an
    /// error (spec.md §4.2); per-topic order is preserved because each
    /// topic is backed by its own channel and this method never reorders
    /// relative to other calls on the same topic.
    pub fn publish(&self, topic: &str, event: Event) {
        let sender = {
            let topics = self.topics.read();
            topics.get(topic).cloned()
        };
        let sender = match sender {
            Some(tx) => tx,
            None => {
                let mut topics = self.topics.write();
                topics
                    .entry(topic.to_string())
                    .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                    .clone()
            }
        };
        match sender.send(event) {
            Ok(subscriber_count) => {
                debug!(topic, subscriber_count, "published event");
            }
            Err(_) => {
                // No receivers currently subscribed — not a failure.
                debug!(topic, "published event with no subscribers");
            }
        }
    }

    /// Publish the general topic plus a per-entity topic in one call, the
    /// pattern every engine operation in spec.md §4.2/§4.3/§4.4 uses
    /// (`orders` + `orders/{idOrder}`, `bottle-counter` +
    /// `bottle-counter/{idOrder}`, ...).
    pub fn publish_general_and_scoped(
        &self,
        general_topic: &str,
        scoped_topic: &str,
        event: Event,
    ) {
        self.publish(scoped_topic, event.clone());
        self.publish(general_topic, event);
    }
}

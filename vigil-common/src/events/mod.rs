//! Per-owner notification fan-out
//!
//! One logical topic per owner (`owner:{id}`), each backed by its own
//! `tokio::sync::broadcast` channel. A topic exists only while it has at least
//! one subscriber: the first `subscribe` creates it and dropping the last
//! [`Subscription`] removes it.
//!
//! Delivery is at-most-once and best-effort:
//! - publishing to an owner with no subscriber drops the event
//! - a subscriber that falls more than `capacity` events behind skips the
//!   missed events and keeps receiving newer ones

mod types;

pub use types::{ClientMessage, Notification, ServerMessage, SessionStatusUpdate};

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default per-topic buffer
pub const DEFAULT_TOPIC_CAPACITY: usize = 100;

type Topics = Arc<RwLock<HashMap<i64, broadcast::Sender<Notification>>>>;

/// Topic name for an owner
pub fn topic_name(owner_id: i64) -> String {
    format!("owner:{}", owner_id)
}

/// Registry of per-owner broadcast topics
///
/// Cheap to clone; clones share the same topics.
///
/// # Examples
///
/// ```
/// use vigil_common::events::{Notification, NotificationHub};
/// use serde_json::json;
///
/// let hub = NotificationHub::new(16);
///
/// // No subscriber: dropped
/// assert_eq!(hub.publish(1, Notification::Detection(json!({"id": 1}))), 0);
///
/// let subscription = hub.subscribe(1);
/// assert_eq!(hub.publish(1, Notification::Detection(json!({"id": 2}))), 1);
///
/// drop(subscription);
/// assert_eq!(hub.topic_count(), 0);
/// ```
#[derive(Clone)]
pub struct NotificationHub {
    topics: Topics,
    capacity: usize,
}

impl NotificationHub {
    /// Creates a hub whose topics buffer `capacity` events each
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to an owner's topic, creating it if needed
    ///
    /// Only events published after this call are received.
    pub fn subscribe(&self, owner_id: i64) -> Subscription {
        let mut topics = write_topics(&self.topics);
        let rx = topics
            .entry(owner_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        debug!(topic = %topic_name(owner_id), "Subscriber registered");

        Subscription {
            owner_id,
            rx: Some(rx),
            topics: Arc::clone(&self.topics),
        }
    }

    /// Publish to an owner's topic without blocking
    ///
    /// Returns the number of subscribers the event was handed to; 0 means the
    /// event was dropped.
    pub fn publish(&self, owner_id: i64, notification: Notification) -> usize {
        let topics = match self.topics.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let Some(tx) = topics.get(&owner_id) else {
            debug!(
                topic = %topic_name(owner_id),
                event = notification.event_type(),
                "No subscribers, event dropped"
            );
            return 0;
        };

        let event_type = notification.event_type();
        match tx.send(notification) {
            Ok(delivered) => {
                debug!(topic = %topic_name(owner_id), event = event_type, delivered, "Event published");
                delivered
            }
            Err(_) => 0,
        }
    }

    /// Number of live subscribers on an owner's topic
    pub fn subscriber_count(&self, owner_id: i64) -> usize {
        let topics = match self.topics.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        topics.get(&owner_id).map_or(0, |tx| tx.receiver_count())
    }

    /// Number of topics with at least one subscriber
    pub fn topic_count(&self) -> usize {
        match self.topics.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

fn write_topics(
    topics: &RwLock<HashMap<i64, broadcast::Sender<Notification>>>,
) -> RwLockWriteGuard<'_, HashMap<i64, broadcast::Sender<Notification>>> {
    match topics.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A live subscription to one owner's topic
///
/// Dropping it deregisters the subscriber and removes the topic when it was
/// the last one.
pub struct Subscription {
    owner_id: i64,
    rx: Option<broadcast::Receiver<Notification>>,
    topics: Topics,
}

impl Subscription {
    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }

    /// Wait for the next event
    ///
    /// Lagged events are skipped with a warning. Returns `None` once the
    /// topic is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        topic = %topic_name(self.owner_id),
                        skipped,
                        "Subscriber lagged, events skipped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Release the receiver before checking the count
        drop(self.rx.take());

        let mut topics = write_topics(&self.topics);
        let empty = topics
            .get(&self.owner_id)
            .is_some_and(|tx| tx.receiver_count() == 0);
        if empty {
            topics.remove(&self.owner_id);
            debug!(topic = %topic_name(self.owner_id), "Topic removed");
        }
    }
}

//! Broadcast bus: topic-pattern pub/sub with non-blocking delivery.
//!
//! Each subscription owns a bounded FIFO buffer. Publish iterates matching
//! subscriptions and attempts a non-blocking enqueue; a full buffer drops the
//! message and bumps a counter. A publisher never blocks on subscriber
//! backpressure, and a dropped message never fails the publish call.
//!
//! Delivery is at-most-once, FIFO per subscription, unordered across
//! subscriptions.

mod pattern;

pub use pattern::{PatternError, TopicPattern};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::payload::MessagePayload;

/// Default per-subscription buffer capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("subscription {0} is gone")]
    SubscriptionGone(u64),
}

/// One message on the bus.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: String,
    pub topic: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub payload: MessagePayload,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, sender: impl Into<String>, payload: MessagePayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            sender: sender.into(),
            timestamp: Utc::now(),
            payload,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Predicate over message metadata; all filters on a subscription must pass.
#[derive(Clone, Debug)]
pub enum MetadataFilter {
    /// Metadata key equals the value.
    Eq(String, String),
    /// Metadata key is one of the values.
    In(String, Vec<String>),
}

impl MetadataFilter {
    fn accepts(&self, metadata: &HashMap<String, String>) -> bool {
        match self {
            MetadataFilter::Eq(key, value) => metadata.get(key) == Some(value),
            MetadataFilter::In(key, values) => metadata
                .get(key)
                .map(|v| values.iter().any(|c| c == v))
                .unwrap_or(false),
        }
    }
}

struct SubEntry {
    pattern: TopicPattern,
    filters: Vec<MetadataFilter>,
    tx: mpsc::Sender<BusMessage>,
}

/// Receiving half of a subscription. FIFO; at-most-once.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<BusMessage>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits up to `timeout` for the next buffered message.
    pub async fn receive(&mut self, timeout: Duration) -> Option<BusMessage> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }

    /// Non-blocking poll of the buffer.
    pub fn try_receive(&mut self) -> Option<BusMessage> {
        self.rx.try_recv().ok()
    }
}

/// Bus-level delivery counters. `published = delivered + dropped` at all
/// times: published counts enqueue attempts after pattern and filter checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BusMetrics {
    pub total_published: u64,
    pub total_delivered: u64,
    pub total_dropped: u64,
}

/// Topic-pattern pub/sub hub.
///
/// **Interaction**: One instance per process, shared via `Arc`. The fabric
/// routes payloads before handing messages to `publish`.
pub struct BroadcastBus {
    subs: DashMap<u64, SubEntry>,
    next_id: AtomicU64,
    buffer_capacity: usize,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::with_buffer_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_buffer_capacity(buffer_capacity: usize) -> Self {
        Self {
            subs: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer_capacity,
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Subscribes to a topic pattern with optional metadata filters.
    pub fn subscribe(
        &self,
        pattern: &str,
        filters: Vec<MetadataFilter>,
    ) -> Result<Subscription, BusError> {
        let pattern = TopicPattern::parse(pattern)?;
        let (tx, rx) = mpsc::channel(self.buffer_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subs.insert(
            id,
            SubEntry {
                pattern,
                filters,
                tx,
            },
        );
        Ok(Subscription { id, rx })
    }

    /// Removes a subscription; buffered messages are discarded with it.
    pub fn unsubscribe(&self, sub: Subscription) {
        self.subs.remove(&sub.id);
    }

    /// Delivers to every matching subscription without blocking. A full
    /// buffer drops the message for that subscription only.
    pub fn publish(&self, message: BusMessage) {
        for entry in self.subs.iter() {
            if !entry.pattern.matches(&message.topic) {
                continue;
            }
            if !entry.filters.iter().all(|f| f.accepts(&message.metadata)) {
                // Filtered messages are silently not delivered (and not counted).
                continue;
            }
            self.published.fetch_add(1, Ordering::Relaxed);
            match entry.tx.try_send(message.clone()) {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        topic = %message.topic,
                        subscription = entry.key(),
                        "bus buffer full or closed; message dropped"
                    );
                }
            }
        }
    }

    pub fn metrics(&self) -> BusMetrics {
        BusMetrics {
            total_published: self.published.load(Ordering::Relaxed),
            total_delivered: self.delivered.load(Ordering::Relaxed),
            total_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subs.len()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle alias used across the runtime.
pub type SharedBus = Arc<BroadcastBus>;

//! Event channel between intake and triage
//!
//! An append-only stream read through named consumer groups. Each group has
//! its own cursor and its own pending-entries list; a delivery stays pending
//! until acknowledged and is handed out again once its visibility timeout
//! lapses. Delivery is therefore at-least-once: consumers must be idempotent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::models::LeadEvent;
use crate::Result;

pub mod sqlite;

pub use sqlite::SqliteEventChannel;

/// Transport-level message id, monotonically increasing within a stream
///
/// Only meaningful to the channel. Effect dedup uses the event's content
/// hash, never this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One delivery of one message to one consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: MessageId,
    /// 1 on first delivery, incremented on every redelivery
    pub delivery_count: u32,
    pub event: LeadEvent,
}

/// Operations the pipeline needs from a broker
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Append an event; order is preserved within the stream
    async fn publish(&self, event: &LeadEvent) -> Result<MessageId>;

    /// Create the consumer group if missing; safe to call repeatedly
    ///
    /// A new group starts at the beginning of the stream.
    async fn ensure_consumer_group(&self, group: &str) -> Result<()>;

    /// Claim up to `max_count` deliveries for `consumer`, waiting at most
    /// `block_timeout` for something to arrive
    ///
    /// Expired pending deliveries are reclaimed before new messages are read.
    async fn consume(
        &self,
        group: &str,
        consumer: &str,
        max_count: usize,
        block_timeout: Duration,
    ) -> Result<Vec<Delivery>>;

    /// Mark a message processed for a group; acking twice is harmless
    async fn ack(&self, group: &str, message_id: MessageId) -> Result<()>;

    /// Park a message the group gave up on and remove it from pending
    async fn dead_letter(&self, group: &str, delivery: &Delivery, reason: &str) -> Result<()>;

    /// Number of delivered-but-unacknowledged messages in a group
    async fn pending_count(&self, group: &str) -> Result<u64>;
}

//! Topic/consumer-group contracts.
//!
//! The bus makes minimal assumptions so one set of semantics covers both the
//! in-memory broker and a Redis Streams deployment:
//!
//! - **Durable publish**: `publish` returns only after the broker has
//!   recorded the message.
//! - **At-least-once**: a delivery not acknowledged within the visibility
//!   timeout comes back, possibly to another consumer in the group.
//! - **Fan-out across groups, load-balancing within a group**: every group
//!   sees every message; inside a group each delivery goes to one consumer.
//! - **No ordering guarantees** once redeliveries are in play.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("broker backend error: {0}")]
    Backend(String),
}

/// A message handed to a consumer, with redelivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned id, stable across redeliveries.
    pub message_id: String,
    pub payload: String,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: u32,
}

/// A message parked after exhausting its delivery budget.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message_id: String,
    pub payload: String,
    pub delivery_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

/// When deliveries are retried and when they are given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    /// Times a message may be handed out before it is dead-lettered.
    /// Must be at least 1.
    pub max_deliveries: u32,
    /// An unacknowledged delivery older than this is considered abandoned
    /// and requeued.
    pub visibility_timeout: Duration,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_deliveries: 5,
            visibility_timeout: Duration::from_secs(60),
        }
    }
}

impl RedeliveryPolicy {
    pub fn new(max_deliveries: u32, visibility_timeout: Duration) -> Self {
        Self {
            max_deliveries,
            visibility_timeout,
        }
    }

    /// True once a message has used up its delivery budget.
    pub fn exhausted(&self, delivery_count: u32) -> bool {
        delivery_count >= self.max_deliveries
    }
}

/// Durable topic-based message broker.
pub trait MessageBus: Send + Sync {
    /// Append `payload` to `topic`. Returns the broker-assigned message id.
    fn publish(&self, topic: &str, payload: String) -> Result<String, BusError>;

    /// Join `group` on `topic` as the named consumer. Creating the group is
    /// idempotent; a new group starts from the beginning of the retained
    /// stream.
    fn subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Box<dyn GroupConsumer>, BusError>;
}

impl<B> MessageBus for Arc<B>
where
    B: MessageBus + ?Sized,
{
    fn publish(&self, topic: &str, payload: String) -> Result<String, BusError> {
        (**self).publish(topic, payload)
    }

    fn subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Box<dyn GroupConsumer>, BusError> {
        (**self).subscribe(topic, group, consumer)
    }
}

/// One consumer's membership in a consumer group.
///
/// Designed for single-threaded consumption: one worker thread owns the
/// handle and drives `recv_timeout` in a loop, acknowledging each delivery
/// once it has been processed.
pub trait GroupConsumer: Send {
    /// Wait up to `timeout` for the next delivery. `Ok(None)` on timeout.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Delivery>, BusError>;

    /// Mark the delivery processed. The broker will not hand it to this
    /// group again.
    fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError>;

    /// Give the delivery back. The broker requeues it for the group, or
    /// parks it on the dead-letter queue once its budget is exhausted.
    fn nack(&mut self, delivery: &Delivery) -> Result<(), BusError>;
}

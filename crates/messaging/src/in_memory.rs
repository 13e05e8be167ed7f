//! In-memory broker with consumer-group semantics.
//!
//! Mirrors the behavior of the Redis Streams deployment closely enough that
//! the notification pipeline can be exercised end to end in tests and in
//! single-process development mode: messages are retained per topic, every
//! group gets its own cursor over the retained stream, abandoned deliveries
//! are requeued after the visibility timeout, and exhausted deliveries land
//! in a per-topic dead-letter queue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::bus::{BusError, DeadLetter, Delivery, GroupConsumer, MessageBus, RedeliveryPolicy};

/// Upper bound on one condvar wait, so an expired visibility timeout is
/// noticed promptly even while blocked in `recv_timeout`.
const SWEEP_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    payload: String,
}

#[derive(Debug)]
struct InFlight {
    message: StoredMessage,
    delivery_count: u32,
    delivered_at: Instant,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Next index into the topic log this group has not yet fetched.
    cursor: usize,
    /// Requeued messages, paired with their previous delivery count.
    /// Served before anything new from the log.
    ready: VecDeque<(StoredMessage, u32)>,
    /// Outstanding deliveries keyed by message id.
    in_flight: HashMap<String, InFlight>,
}

#[derive(Debug, Default)]
struct TopicState {
    log: Vec<StoredMessage>,
    groups: HashMap<String, GroupState>,
    dead: Vec<DeadLetter>,
}

#[derive(Debug)]
struct BrokerInner {
    state: Mutex<HashMap<String, TopicState>>,
    published: Condvar,
    next_id: AtomicU64,
    policy: RedeliveryPolicy,
}

/// Process-local [`MessageBus`].
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_policy(RedeliveryPolicy::default())
    }

    pub fn with_policy(policy: RedeliveryPolicy) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(HashMap::new()),
                published: Condvar::new(),
                next_id: AtomicU64::new(1),
                policy,
            }),
        }
    }

    /// Messages parked on the topic's dead-letter queue, oldest first.
    pub fn dead_letters(&self, topic: &str) -> Result<Vec<DeadLetter>, BusError> {
        let state = self.lock_state()?;
        Ok(state
            .get(topic)
            .map(|t| t.dead.clone())
            .unwrap_or_default())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, HashMap<String, TopicState>>, BusError> {
        self.inner
            .state
            .lock()
            .map_err(|_| BusError::Backend("lock poisoned".to_string()))
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for InMemoryBroker {
    fn publish(&self, topic: &str, payload: String) -> Result<String, BusError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst).to_string();

        let mut state = self.lock_state()?;
        state
            .entry(topic.to_string())
            .or_default()
            .log
            .push(StoredMessage {
                id: id.clone(),
                payload,
            });
        drop(state);

        self.inner.published.notify_all();
        Ok(id)
    }

    fn subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Box<dyn GroupConsumer>, BusError> {
        let mut state = self.lock_state()?;
        state
            .entry(topic.to_string())
            .or_default()
            .groups
            .entry(group.to_string())
            .or_default();
        drop(state);

        debug!(topic, group, consumer, "consumer joined group");

        Ok(Box::new(InMemoryGroupConsumer {
            broker: self.clone(),
            topic: topic.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
        }))
    }
}

struct InMemoryGroupConsumer {
    broker: InMemoryBroker,
    topic: String,
    group: String,
    consumer: String,
}

impl InMemoryGroupConsumer {
    /// Requeue abandoned deliveries; dead-letter the exhausted ones.
    fn sweep_expired(&self, topic: &mut TopicState) {
        let policy = self.broker.inner.policy;
        let Some(group) = topic.groups.get_mut(&self.group) else {
            return;
        };

        let expired: Vec<String> = group
            .in_flight
            .iter()
            .filter(|(_, f)| f.delivered_at.elapsed() >= policy.visibility_timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            let Some(flight) = group.in_flight.remove(&id) else {
                continue;
            };
            if policy.exhausted(flight.delivery_count) {
                park_dead_letter(&mut topic.dead, flight, &self.consumer);
            } else {
                group.ready.push_back((flight.message, flight.delivery_count));
            }
        }
    }

    fn take_next(&self, topic: &mut TopicState) -> Option<Delivery> {
        let group = topic.groups.get_mut(&self.group)?;

        let (message, previous_count) = match group.ready.pop_front() {
            Some(requeued) => requeued,
            None => {
                let message = topic.log.get(group.cursor)?.clone();
                group.cursor += 1;
                (message, 0)
            }
        };

        let delivery_count = previous_count + 1;
        let delivery = Delivery {
            message_id: message.id.clone(),
            payload: message.payload.clone(),
            delivery_count,
        };
        group.in_flight.insert(
            message.id.clone(),
            InFlight {
                message,
                delivery_count,
                delivered_at: Instant::now(),
            },
        );
        Some(delivery)
    }
}

impl GroupConsumer for InMemoryGroupConsumer {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Delivery>, BusError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.broker.lock_state()?;

        loop {
            if let Some(topic) = state.get_mut(&self.topic) {
                self.sweep_expired(topic);
                if let Some(delivery) = self.take_next(topic) {
                    return Ok(Some(delivery));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let wait = (deadline - now).min(SWEEP_INTERVAL);
            let (guard, _) = self
                .broker
                .inner
                .published
                .wait_timeout(state, wait)
                .map_err(|_| BusError::Backend("lock poisoned".to_string()))?;
            state = guard;
        }
    }

    fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        let mut state = self.broker.lock_state()?;
        if let Some(group) = state
            .get_mut(&self.topic)
            .and_then(|t| t.groups.get_mut(&self.group))
        {
            // A miss means the delivery already expired and was requeued;
            // the duplicate will be processed again, which at-least-once
            // consumers tolerate.
            group.in_flight.remove(&delivery.message_id);
        }
        Ok(())
    }

    fn nack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        let mut state = self.broker.lock_state()?;
        let Some(topic) = state.get_mut(&self.topic) else {
            return Ok(());
        };
        let policy = self.broker.inner.policy;

        if let Some(group) = topic.groups.get_mut(&self.group) {
            if let Some(flight) = group.in_flight.remove(&delivery.message_id) {
                if policy.exhausted(flight.delivery_count) {
                    park_dead_letter(&mut topic.dead, flight, &self.consumer);
                } else {
                    group.ready.push_back((flight.message, flight.delivery_count));
                }
            }
        }
        drop(state);

        self.broker.inner.published.notify_all();
        Ok(())
    }
}

fn park_dead_letter(dead: &mut Vec<DeadLetter>, flight: InFlight, consumer: &str) {
    warn!(
        message_id = %flight.message.id,
        delivery_count = flight.delivery_count,
        consumer,
        "message exhausted its delivery budget, parking on dead-letter queue"
    );
    dead.push(DeadLetter {
        message_id: flight.message.id,
        payload: flight.message.payload,
        delivery_count: flight.delivery_count,
        dead_lettered_at: chrono::Utc::now(),
    });
}

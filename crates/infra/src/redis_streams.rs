//! Redis Streams-backed message bus (durable, at-least-once delivery).
//!
//! Topics map to stream keys. Each subscriber joins a consumer group:
//!
//! - **Durable publish**: XADD appends the payload; it stays until every
//!   group acknowledges it.
//! - **Work sharing**: XREADGROUP hands each entry to one member per group.
//! - **Redelivery**: entries idle past the visibility timeout are claimed
//!   back with XCLAIM, which also bumps the delivery counter.
//! - **Dead-lettering**: an entry whose deliveries are used up is appended
//!   to `<topic>:dlq` with its metadata and acknowledged away.
//!
//! Consumers must tolerate duplicates; a crash between processing and ack
//! replays the entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use stayforge_messaging::{
    BusError, DeadLetter, Delivery, GroupConsumer, MessageBus, RedeliveryPolicy,
};

#[derive(Debug, Clone)]
pub struct RedisStreamsBroker {
    client: Arc<redis::Client>,
    policy: RedeliveryPolicy,
}

impl RedisStreamsBroker {
    /// Connect lazily to `redis_url` (e.g. `redis://localhost:6379`).
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BusError::Backend(format!("redis open: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            policy: RedeliveryPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: RedeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn connection(&self) -> Result<redis::Connection, BusError> {
        self.client
            .get_connection()
            .map_err(|e| BusError::Backend(format!("redis connect: {e}")))
    }

    /// Dead letters parked for `topic`, oldest first.
    pub fn dead_letters(&self, topic: &str) -> Result<Vec<DeadLetter>, BusError> {
        let key = dlq_key(topic);
        let mut conn = self.connection()?;
        let entries: Vec<redis::Value> = redis::cmd("XRANGE")
            .arg(&key)
            .arg("-")
            .arg("+")
            .query(&mut conn)
            .map_err(|e| command_error("XRANGE", &key, e))?;

        let mut dead = Vec::with_capacity(entries.len());
        for entry in entries {
            let (_, fields) = split_entry(entry)?;
            dead.push(dead_letter_from_fields(&fields)?);
        }
        Ok(dead)
    }
}

impl MessageBus for RedisStreamsBroker {
    #[instrument(skip(self, payload), fields(topic), err)]
    fn publish(&self, topic: &str, payload: String) -> Result<String, BusError> {
        let mut conn = self.connection()?;
        let id: String = redis::cmd("XADD")
            .arg(topic)
            .arg("*")
            .arg("payload")
            .arg(&payload)
            .query(&mut conn)
            .map_err(|e| command_error("XADD", topic, e))?;

        Ok(id)
    }

    fn subscribe(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Box<dyn GroupConsumer>, BusError> {
        let mut conn = self.connection()?;

        // New groups start at "0" so they see the retained backlog.
        // BUSYGROUP means the group already exists, which is fine.
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(topic)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);
        if let Err(e) = created {
            if !e.to_string().contains("BUSYGROUP") {
                return Err(command_error("XGROUP CREATE", topic, e));
            }
        }
        debug!(topic, group, consumer, "joined consumer group");

        Ok(Box::new(RedisGroupConsumer {
            client: self.client.clone(),
            topic: topic.to_string(),
            dlq: dlq_key(topic),
            group: group.to_string(),
            consumer: consumer.to_string(),
            policy: self.policy,
            conn: None,
        }))
    }
}

/// One member of a consumer group.
///
/// Holds its own connection; a failed command drops it so the next call
/// reconnects.
pub struct RedisGroupConsumer {
    client: Arc<redis::Client>,
    topic: String,
    dlq: String,
    group: String,
    consumer: String,
    policy: RedeliveryPolicy,
    conn: Option<redis::Connection>,
}

impl RedisGroupConsumer {
    fn connection(&mut self) -> Result<&mut redis::Connection, BusError> {
        match &mut self.conn {
            Some(conn) => Ok(conn),
            slot => {
                let conn = self
                    .client
                    .get_connection()
                    .map_err(|e| BusError::Backend(format!("redis connect: {e}")))?;
                Ok(slot.insert(conn))
            }
        }
    }

    /// Recover entries idle past the visibility timeout, parking the ones
    /// whose deliveries are used up.
    fn claim_expired(&mut self) -> Result<Option<Delivery>, BusError> {
        let visibility_ms = self.policy.visibility_timeout.as_millis() as u64;
        loop {
            let mut cmd = redis::cmd("XPENDING");
            cmd.arg(&self.topic)
                .arg(&self.group)
                .arg("IDLE")
                .arg(visibility_ms)
                .arg("-")
                .arg("+")
                .arg(1);
            let pending: Vec<(String, String, u64, u64)> = self.run(cmd, "XPENDING")?;

            let Some((id, _owner, _idle_ms, delivered)) = pending.into_iter().next() else {
                return Ok(None);
            };
            let delivered = delivered as u32;

            if self.policy.exhausted(delivered) {
                self.park(&id, delivered)?;
                continue;
            }

            // Claiming moves the entry to this consumer and bumps its
            // delivery counter.
            let mut cmd = redis::cmd("XCLAIM");
            cmd.arg(&self.topic)
                .arg(&self.group)
                .arg(&self.consumer)
                .arg(visibility_ms)
                .arg(&id);
            let entries: Vec<redis::Value> = self.run(cmd, "XCLAIM")?;

            let Some(entry) = entries.into_iter().next() else {
                // Another member won the claim.
                continue;
            };
            let (message_id, fields) = split_entry(entry)?;
            let payload = field_value(&fields, "payload")
                .ok_or_else(|| protocol("stream entry without payload"))?;

            return Ok(Some(Delivery {
                message_id,
                payload,
                delivery_count: delivered + 1,
            }));
        }
    }

    fn read_new(&mut self, timeout: Duration) -> Result<Option<Delivery>, BusError> {
        let block_ms = timeout.as_millis().max(1) as u64;
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.topic)
            .arg(">");
        let reply: Option<HashMap<String, Vec<redis::Value>>> = self.run(cmd, "XREADGROUP")?;

        // A nil reply is the block timeout expiring with nothing new.
        let Some(mut streams) = reply else {
            return Ok(None);
        };
        let Some(entry) = streams
            .remove(&self.topic)
            .and_then(|entries| entries.into_iter().next())
        else {
            return Ok(None);
        };
        let (message_id, fields) = split_entry(entry)?;
        let payload = field_value(&fields, "payload")
            .ok_or_else(|| protocol("stream entry without payload"))?;

        Ok(Some(Delivery {
            message_id,
            payload,
            delivery_count: 1,
        }))
    }

    /// Move a pending entry onto the DLQ and acknowledge it away.
    fn park(&mut self, id: &str, delivered: u32) -> Result<(), BusError> {
        let mut cmd = redis::cmd("XRANGE");
        cmd.arg(&self.topic).arg(id).arg(id);
        let entries: Vec<redis::Value> = self.run(cmd, "XRANGE")?;

        match entries.into_iter().next() {
            Some(entry) => {
                let (_, fields) = split_entry(entry)?;
                let payload = field_value(&fields, "payload")
                    .ok_or_else(|| protocol("stream entry without payload"))?;
                self.push_dead_letter(id, &payload, delivered)?;
            }
            None => {
                warn!(topic = %self.topic, message_id = %id, "pending entry no longer in the stream, dropping");
            }
        }
        self.ack_id(id)
    }

    fn push_dead_letter(&mut self, id: &str, payload: &str, delivered: u32) -> Result<(), BusError> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.dlq)
            .arg("*")
            .arg("original_message_id")
            .arg(id)
            .arg("delivery_count")
            .arg(delivered)
            .arg("dead_lettered_at")
            .arg(Utc::now().to_rfc3339())
            .arg("payload")
            .arg(payload);
        let _: String = self.run(cmd, "XADD")?;

        warn!(
            topic = %self.topic,
            message_id = %id,
            delivery_count = delivered,
            "message parked on the dead-letter queue"
        );
        Ok(())
    }

    fn ack_id(&mut self, id: &str) -> Result<(), BusError> {
        let mut cmd = redis::cmd("XACK");
        cmd.arg(&self.topic).arg(&self.group).arg(id);
        let _: u64 = self.run(cmd, "XACK")?;
        Ok(())
    }

    fn run<T: redis::FromRedisValue>(
        &mut self,
        cmd: redis::Cmd,
        what: &str,
    ) -> Result<T, BusError> {
        let result = cmd.query(self.connection()?);
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.conn = None;
                Err(command_error(what, &self.topic, e))
            }
        }
    }
}

impl GroupConsumer for RedisGroupConsumer {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Delivery>, BusError> {
        // Recover abandoned work before asking for new entries.
        if let Some(delivery) = self.claim_expired()? {
            return Ok(Some(delivery));
        }
        self.read_new(timeout)
    }

    fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        self.ack_id(&delivery.message_id)
    }

    fn nack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
        if self.policy.exhausted(delivery.delivery_count) {
            self.push_dead_letter(
                &delivery.message_id,
                &delivery.payload,
                delivery.delivery_count,
            )?;
            return self.ack_id(&delivery.message_id);
        }

        // Age the entry so the next claim sweep picks it up right away.
        // JUSTID leaves the delivery counter for that claim to bump.
        let visibility_ms = self.policy.visibility_timeout.as_millis() as u64;
        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&self.topic)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(0)
            .arg(&delivery.message_id)
            .arg("IDLE")
            .arg(visibility_ms)
            .arg("JUSTID");
        let _: Vec<String> = self.run(cmd, "XCLAIM")?;
        Ok(())
    }
}

fn dlq_key(topic: &str) -> String {
    format!("{topic}:dlq")
}

fn command_error(what: &str, key: &str, e: impl core::fmt::Display) -> BusError {
    BusError::Backend(format!("{what} {key}: {e}"))
}

fn protocol(detail: &str) -> BusError {
    BusError::Backend(format!("redis reply: {detail}"))
}

/// Split a stream entry reply (`[id, [field, value, ...]]`).
fn split_entry(entry: redis::Value) -> Result<(String, Vec<redis::Value>), BusError> {
    let redis::Value::Bulk(mut parts) = entry else {
        return Err(protocol("stream entry is not an array"));
    };
    if parts.len() != 2 {
        return Err(protocol("stream entry has unexpected shape"));
    }
    let fields = match parts.pop() {
        Some(redis::Value::Bulk(fields)) => fields,
        _ => return Err(protocol("stream entry fields are not an array")),
    };
    let id = match parts.pop() {
        Some(redis::Value::Data(data)) => String::from_utf8_lossy(&data).to_string(),
        _ => return Err(protocol("stream entry id is not a string")),
    };
    Ok((id, fields))
}

fn field_value(fields: &[redis::Value], name: &str) -> Option<String> {
    for pair in fields.chunks(2) {
        if let [redis::Value::Data(key), redis::Value::Data(value)] = pair {
            if key.as_slice() == name.as_bytes() {
                return Some(String::from_utf8_lossy(value).to_string());
            }
        }
    }
    None
}

fn dead_letter_from_fields(fields: &[redis::Value]) -> Result<DeadLetter, BusError> {
    let message_id = field_value(fields, "original_message_id")
        .ok_or_else(|| protocol("dead letter without original_message_id"))?;
    let payload =
        field_value(fields, "payload").ok_or_else(|| protocol("dead letter without payload"))?;
    let delivery_count = field_value(fields, "delivery_count")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| protocol("dead letter without delivery_count"))?;
    let dead_lettered_at = field_value(fields, "dead_lettered_at")
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| protocol("dead letter without dead_lettered_at"))?;

    Ok(DeadLetter {
        message_id,
        payload,
        delivery_count,
        dead_lettered_at,
    })
}

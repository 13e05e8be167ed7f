//! Durable notification transport (mechanics only).
//!
//! Producers append JSON payloads to a topic; consumer groups read them with
//! at-least-once delivery. A delivery that is neither acknowledged nor
//! negatively acknowledged is redelivered after a visibility timeout, and a
//! delivery that exhausts its budget is parked on a dead-letter queue.
//! Consumers must therefore be idempotent.

pub mod bus;
pub mod in_memory;
pub mod notification;

pub use bus::{BusError, DeadLetter, Delivery, GroupConsumer, MessageBus, RedeliveryPolicy};
pub use in_memory::InMemoryBroker;
pub use notification::NotificationRequest;

/// Stream carrying notification requests.
pub const NOTIFICATIONS_TOPIC: &str = "stayforge:notifications";

/// Consumer group the mail dispatcher reads notifications with.
pub const MAILER_GROUP: &str = "notifications.mailer";

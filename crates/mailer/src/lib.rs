//! `stayforge-mailer` — the notification consumer.
//!
//! A background worker drains the notifications topic through a consumer
//! group and hands each decoded request to a [`MailTransport`]. Malformed
//! payloads are acknowledged and dropped; failed dispatches are redelivered
//! by the bus until its ceiling parks them on the dead-letter queue.

pub mod in_memory;
pub mod transport;
pub mod worker;

pub use in_memory::InMemoryMailbox;
pub use transport::{MailError, MailTransport, SmtpConfig, SmtpCredentials, SmtpMailer};
pub use worker::{MailerWorker, WorkerHandle};

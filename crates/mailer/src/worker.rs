//! Background dispatcher draining the notifications topic.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};
use uuid::Uuid;

use stayforge_messaging::{
    BusError, Delivery, GroupConsumer, MessageBus, NotificationRequest, MAILER_GROUP,
    NOTIFICATIONS_TOPIC,
};

use crate::transport::MailTransport;

const TICK: Duration = Duration::from_millis(250);

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Mail dispatch loop.
///
/// - Joins the mailer consumer group on the notifications topic
/// - Decodes each delivery and hands it to the transport
/// - Acknowledges successes and malformed payloads, rejects failures so
///   the bus redelivers them (and eventually dead-letters them)
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct MailerWorker;

impl MailerWorker {
    /// Spawn a dispatcher thread consuming from `bus`.
    ///
    /// Each spawn registers a fresh member in the shared consumer group, so
    /// running several workers divides the topic between them.
    pub fn spawn(
        name: &'static str,
        bus: &dyn MessageBus,
        transport: Arc<dyn MailTransport>,
    ) -> Result<WorkerHandle, BusError> {
        let member = format!("{name}-{}", Uuid::now_v7());
        let consumer = bus.subscribe(NOTIFICATIONS_TOPIC, MAILER_GROUP, &member)?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, consumer, transport, shutdown_rx))
            .expect("failed to spawn mailer worker thread");

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop(
    name: &'static str,
    mut consumer: Box<dyn GroupConsumer>,
    transport: Arc<dyn MailTransport>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        // Shutdown check (non-blocking)
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let delivery = match consumer.recv_timeout(TICK) {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(e) => {
                error!(worker = name, error = %e, "mailer worker cannot read from the bus");
                thread::sleep(TICK);
                continue;
            }
        };

        dispatch(name, consumer.as_mut(), transport.as_ref(), &delivery);
    }
}

fn dispatch(
    name: &str,
    consumer: &mut dyn GroupConsumer,
    transport: &dyn MailTransport,
    delivery: &Delivery,
) {
    let mail = match NotificationRequest::from_json(&delivery.payload) {
        Ok(mail) => mail,
        Err(e) => {
            // A malformed payload can never succeed. Acknowledge it and
            // move on instead of cycling it through redelivery.
            warn!(
                worker = name,
                message_id = %delivery.message_id,
                error = %e,
                "skipping malformed notification"
            );
            acknowledge(name, consumer, delivery);
            return;
        }
    };

    match transport.deliver(&mail) {
        Ok(()) => {
            debug!(
                worker = name,
                message_id = %delivery.message_id,
                to = %mail.to,
                "notification delivered"
            );
            acknowledge(name, consumer, delivery);
        }
        Err(e) => {
            warn!(
                worker = name,
                message_id = %delivery.message_id,
                delivery_count = delivery.delivery_count,
                error = %e,
                "mail dispatch failed, leaving the message for redelivery"
            );
            if let Err(e) = consumer.nack(delivery) {
                warn!(worker = name, message_id = %delivery.message_id, error = %e, "nack failed");
            }
        }
    }
}

fn acknowledge(name: &str, consumer: &mut dyn GroupConsumer, delivery: &Delivery) {
    if let Err(e) = consumer.ack(delivery) {
        warn!(worker = name, message_id = %delivery.message_id, error = %e, "ack failed");
    }
}

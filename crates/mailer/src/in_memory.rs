//! Recording transport for dev and test.

use std::sync::Mutex;

use tracing::info;

use stayforge_messaging::NotificationRequest;

use crate::transport::{MailError, MailTransport};

/// [`MailTransport`] that records instead of sending.
///
/// Used in tests and as the fallback transport when no relay is
/// configured, so the rest of the pipeline behaves exactly as it would in
/// production.
#[derive(Debug, Default)]
pub struct InMemoryMailbox {
    sent: Mutex<Vec<NotificationRequest>>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far, in order.
    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl MailTransport for InMemoryMailbox {
    fn deliver(&self, mail: &NotificationRequest) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "mail recorded (in-memory transport)");
        self.sent
            .lock()
            .map_err(|_| MailError::Transport("lock poisoned".to_string()))?
            .push(mail.clone());
        Ok(())
    }
}

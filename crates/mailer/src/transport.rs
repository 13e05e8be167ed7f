//! Mail delivery seam and the SMTP implementation behind it.

use std::sync::Arc;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::debug;

use stayforge_core::EmailAddress;
use stayforge_messaging::NotificationRequest;

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum MailError {
    /// An address could not be turned into a mailbox header.
    #[error("invalid mail address: {0}")]
    Address(String),

    /// The message itself could not be assembled.
    #[error("could not build message: {0}")]
    Message(String),

    /// The relay rejected the message or was unreachable.
    #[error("smtp transport failed: {0}")]
    Transport(String),
}

/// Delivers a single mail.
///
/// Called from the dispatcher thread; an error means the delivery failed
/// and the bus should redeliver the message later.
pub trait MailTransport: Send + Sync {
    fn deliver(&self, mail: &NotificationRequest) -> Result<(), MailError>;
}

impl<T> MailTransport for Arc<T>
where
    T: MailTransport + ?Sized,
{
    fn deliver(&self, mail: &NotificationRequest) -> Result<(), MailError> {
        T::deliver(self, mail)
    }
}

/// Relay login.
#[derive(Clone)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: String,
}

impl core::fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Connection settings for the SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Login for the relay. Local development relays may run open.
    pub credentials: Option<SmtpCredentials>,
    /// Address notifications are sent from.
    pub sender: EmailAddress,
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>, sender: EmailAddress) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SMTP_PORT,
            credentials: None,
            sender,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(SmtpCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`MailTransport`] backed by a real SMTP relay.
pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
}

impl SmtpMailer {
    /// Settings are validated up front so a bad host or sender address
    /// fails here, not on the first delivery.
    pub fn new(config: SmtpConfig) -> Result<Self, MailError> {
        let sender: Mailbox = config
            .sender
            .as_str()
            .parse()
            .map_err(|e| MailError::Address(format!("sender: {e}")))?;

        let mut builder = SmtpTransport::relay(&config.host)
            .map_err(|e| MailError::Transport(format!("relay {}: {e}", config.host)))?
            .port(config.port)
            .timeout(Some(config.timeout));
        if let Some(credentials) = config.credentials {
            builder = builder.credentials(Credentials::new(
                credentials.username,
                credentials.password,
            ));
        }

        Ok(Self {
            transport: builder.build(),
            sender,
        })
    }
}

impl MailTransport for SmtpMailer {
    fn deliver(&self, mail: &NotificationRequest) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(mail
                .to
                .as_str()
                .parse()
                .map_err(|e| MailError::Address(format!("recipient: {e}")))?)
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| MailError::Message(e.to_string()))?;

        self.transport
            .send(&message)
            .map_err(|e| MailError::Transport(e.to_string()))?;

        debug!(to = %mail.to, "mail handed to the smtp relay");
        Ok(())
    }
}

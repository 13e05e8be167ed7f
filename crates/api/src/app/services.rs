//! Infrastructure wiring behind the routes.
//!
//! Every dependency is a trait object, so the same router runs against
//! in-memory infrastructure (dev/test) or Postgres + Redis + SMTP, chosen
//! from the environment at startup.

use std::sync::Arc;

use tracing::{info, warn};

use stayforge_availability::{AvailabilityLedger, InMemoryAvailabilityLedger};
use stayforge_booking::{BookingOrchestrator, BookingStore, CheckoutConfig, InMemoryBookingStore};
use stayforge_catalog::{CatalogStore, InMemoryCatalogStore};
use stayforge_core::EmailAddress;
use stayforge_infra::{
    PostgresAvailabilityLedger, PostgresBookingStore, PostgresCatalogStore, RedisStreamsBroker,
    ensure_schema,
};
use stayforge_mailer::{InMemoryMailbox, MailTransport, MailerWorker, SmtpConfig, SmtpMailer};
use stayforge_messaging::{InMemoryBroker, MessageBus};
use stayforge_payments::{
    CheckoutGateway, MockCheckoutProvider, PaymentVerifier, StripeClient, StripeConfig,
};

/// Everything the routes need.
pub struct AppServices {
    pub catalog: Arc<dyn CatalogStore>,
    pub ledger: Arc<dyn AvailabilityLedger>,
    pub notifications: Arc<dyn MessageBus>,
    pub orchestrator: BookingOrchestrator,
}

impl AppServices {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        bookings: Arc<dyn BookingStore>,
        ledger: Arc<dyn AvailabilityLedger>,
        gateway: Arc<dyn CheckoutGateway>,
        verifier: Arc<dyn PaymentVerifier>,
        notifications: Arc<dyn MessageBus>,
        checkout: CheckoutConfig,
    ) -> Self {
        let orchestrator = BookingOrchestrator::new(
            catalog.clone(),
            bookings,
            ledger.clone(),
            gateway,
            verifier,
            notifications.clone(),
            checkout,
        );

        Self {
            catalog,
            ledger,
            notifications,
            orchestrator,
        }
    }
}

/// Assemble the production service set from the environment.
///
/// Missing configuration falls back to in-process stand-ins with a warning,
/// so a bare `stayforge-api` binary is a working dev server.
pub async fn build_services() -> AppServices {
    let (catalog, bookings, ledger) = stores_from_env().await;
    let (gateway, verifier) = payment_provider_from_env();
    let notifications = broker_from_env();

    let transport = mail_transport_from_env();
    // Runs for the life of the process; the handle is dropped on purpose.
    let _ = MailerWorker::spawn("mail-dispatch", notifications.as_ref(), transport)
        .expect("failed to start the mail dispatch worker");

    AppServices::new(
        catalog,
        bookings,
        ledger,
        gateway,
        verifier,
        notifications,
        checkout_config_from_env(),
    )
}

async fn stores_from_env() -> (
    Arc<dyn CatalogStore>,
    Arc<dyn BookingStore>,
    Arc<dyn AvailabilityLedger>,
) {
    match env_var("DATABASE_URL") {
        Some(url) => {
            let pool = sqlx::PgPool::connect(&url)
                .await
                .expect("failed to connect to Postgres");
            ensure_schema(&pool)
                .await
                .expect("failed to apply the database schema");
            info!("stores backed by Postgres");

            (
                Arc::new(PostgresCatalogStore::new(pool.clone())),
                Arc::new(PostgresBookingStore::new(pool.clone())),
                Arc::new(PostgresAvailabilityLedger::new(pool)),
            )
        }
        None => {
            warn!("DATABASE_URL not set; stores are in-memory and reset on restart");
            let ledger: Arc<dyn AvailabilityLedger> = Arc::new(InMemoryAvailabilityLedger::new());

            (
                Arc::new(InMemoryCatalogStore::new(ledger.clone())),
                Arc::new(InMemoryBookingStore::new()),
                ledger,
            )
        }
    }
}

fn payment_provider_from_env() -> (Arc<dyn CheckoutGateway>, Arc<dyn PaymentVerifier>) {
    match env_var("STRIPE_SECRET_KEY") {
        Some(key) => {
            let client = Arc::new(
                StripeClient::new(StripeConfig::new(key)).expect("failed to build the Stripe client"),
            );
            (client.clone(), client)
        }
        None => {
            warn!("STRIPE_SECRET_KEY not set; using the mock provider (every session verifies paid)");
            let mock = Arc::new(MockCheckoutProvider::new());
            (mock.clone(), mock)
        }
    }
}

fn broker_from_env() -> Arc<dyn MessageBus> {
    match env_var("REDIS_URL") {
        Some(url) => Arc::new(
            RedisStreamsBroker::new(&url).expect("failed to open the Redis Streams broker"),
        ),
        None => {
            warn!("REDIS_URL not set; notifications use the in-process broker");
            Arc::new(InMemoryBroker::new())
        }
    }
}

fn mail_transport_from_env() -> Arc<dyn MailTransport> {
    let host = env_var("SMTP_HOST");
    let sender = env_var("SMTP_SENDER").and_then(|raw| match EmailAddress::new(raw) {
        Ok(sender) => Some(sender),
        Err(e) => {
            warn!(error = %e, "SMTP_SENDER is not a usable address");
            None
        }
    });

    match (host, sender) {
        (Some(host), Some(sender)) => {
            let mut config = SmtpConfig::new(host, sender);
            if let Some(port) = env_var("SMTP_PORT").and_then(|raw| raw.parse().ok()) {
                config = config.with_port(port);
            }
            if let (Some(username), Some(password)) =
                (env_var("SMTP_USERNAME"), env_var("SMTP_PASSWORD"))
            {
                config = config.with_credentials(username, password);
            }

            Arc::new(SmtpMailer::new(config).expect("failed to build the SMTP transport"))
        }
        _ => {
            warn!("SMTP_HOST/SMTP_SENDER not set; mail lands in an in-process mailbox");
            Arc::new(InMemoryMailbox::new())
        }
    }
}

fn checkout_config_from_env() -> CheckoutConfig {
    let defaults = CheckoutConfig::default();
    CheckoutConfig {
        public_base_url: env_var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
        currency: env_var("CURRENCY").unwrap_or(defaults.currency),
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

//! Checkout initiation and payment-callback confirmation.
//!
//! The orchestrator drives a booking from "guest wants this room" to a
//! terminal status:
//!
//! 1. `begin_checkout` prices the room, creates a pending booking and opens
//!    a hosted checkout session bound to it.
//! 2. `confirm` handles the provider's success callback: verify payment,
//!    guard against replays, take one unit of inventory, record the
//!    terminal status and queue the confirmation mail.
//!
//! Inventory is only ever held by a booking that reached `Confirmed`. Any
//! path that takes a unit and then cannot confirm puts the unit back.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{error, instrument, warn};

use stayforge_availability::{AvailabilityLedger, LedgerError};
use stayforge_catalog::{CatalogStore, CatalogStoreError};
use stayforge_core::{BookingId, EmailAddress, ProviderSessionId, RoomId};
use stayforge_messaging::{MessageBus, NotificationRequest, NOTIFICATIONS_TOPIC};
use stayforge_payments::{
    CheckoutGateway, CheckoutSessionRequest, PaymentError, PaymentVerifier,
};

use crate::booking::{Booking, BookingStatus, FailureReason, NewBooking};
use crate::store::{BookingStore, BookingStoreError, Transition};

/// Settings for building checkout sessions.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Public origin the provider redirects back to, without a trailing
    /// slash (e.g. `https://book.example.com`).
    pub public_base_url: String,
    /// ISO currency code, lowercase.
    pub currency: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
            currency: "usd".to_string(),
        }
    }
}

/// Request to start checkout for one room on one date.
#[derive(Debug, Clone)]
pub struct BeginCheckout {
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub guest_email: EmailAddress,
}

/// A checkout that is underway: pending booking plus the URL the guest
/// pays at.
#[derive(Debug, Clone)]
pub struct CheckoutStarted {
    pub booking: Booking,
    pub checkout_url: String,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("room {0} not found")]
    UnknownRoom(RoomId),

    #[error("{0}")]
    Catalog(#[from] CatalogStoreError),

    #[error("checkout session could not be created: {0}")]
    Provider(#[from] PaymentError),

    #[error("{0}")]
    Store(#[from] BookingStoreError),
}

/// Terminal answer for a success callback.
///
/// All three are ordinary business outcomes; a sold-out date is not an
/// error. Replaying the callback for an already-settled booking returns the
/// stored outcome again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// Payment verified and one unit of inventory secured.
    Confirmed(Booking),
    /// The provider reports the session unpaid.
    NotPaid(Booking),
    /// Payment went through but the date sold out first.
    SoldOut(Booking),
}

impl ConfirmationOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            ConfirmationOutcome::Confirmed(b)
            | ConfirmationOutcome::NotPaid(b)
            | ConfirmationOutcome::SoldOut(b) => b,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("booking {0} not found")]
    UnknownBooking(BookingId),

    /// The callback's session is not the one bound to the booking. Nothing
    /// was changed.
    #[error("session does not match booking {0}")]
    SessionMismatch(BookingId),

    /// The provider could not answer. The booking is still pending and the
    /// callback can be retried.
    #[error("payment verification unavailable: {0}")]
    Provider(#[from] PaymentError),

    #[error("{0}")]
    Store(#[from] BookingStoreError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

/// Coordinates catalog, payments, inventory, bookings and notifications.
pub struct BookingOrchestrator {
    catalog: Arc<dyn CatalogStore>,
    bookings: Arc<dyn BookingStore>,
    ledger: Arc<dyn AvailabilityLedger>,
    gateway: Arc<dyn CheckoutGateway>,
    verifier: Arc<dyn PaymentVerifier>,
    notifications: Arc<dyn MessageBus>,
    config: CheckoutConfig,
}

impl BookingOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        bookings: Arc<dyn BookingStore>,
        ledger: Arc<dyn AvailabilityLedger>,
        gateway: Arc<dyn CheckoutGateway>,
        verifier: Arc<dyn PaymentVerifier>,
        notifications: Arc<dyn MessageBus>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            catalog,
            bookings,
            ledger,
            gateway,
            verifier,
            notifications,
            config,
        }
    }

    /// Create a pending booking and the checkout session the guest pays
    /// through.
    ///
    /// Inventory is not touched here; a unit is only taken when the
    /// payment callback confirms. If session creation fails the booking is
    /// left pending and unbound, which can never confirm and holds nothing.
    #[instrument(
        skip(self, request),
        fields(room_id = %request.room_id, date = %request.date),
        err
    )]
    pub async fn begin_checkout(
        &self,
        request: BeginCheckout,
    ) -> Result<CheckoutStarted, CheckoutError> {
        let room = self
            .catalog
            .room(request.room_id)
            .await?
            .ok_or(CheckoutError::UnknownRoom(request.room_id))?;
        let listing = self
            .catalog
            .property(room.property_id)
            .await?
            .ok_or_else(|| {
                warn!(room_id = %room.id, property_id = %room.property_id, "room points at a missing property");
                CheckoutError::UnknownRoom(request.room_id)
            })?;

        let booking = self
            .bookings
            .create(NewBooking {
                room_id: room.id,
                date: request.date,
                guest_email: request.guest_email,
                amount_cents: room.base_price_cents,
            })
            .await?;

        let session = self
            .gateway
            .create_session(&CheckoutSessionRequest {
                product_name: format!("{} ({})", listing.property.name, room.room_type),
                amount_cents: room.base_price_cents,
                currency: self.config.currency.clone(),
                quantity: 1,
                success_url: format!(
                    "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}&booking_id={}",
                    self.config.public_base_url, booking.id
                ),
                cancel_url: format!("{}/checkout/cancel", self.config.public_base_url),
            })
            .await?;

        let booking = self.bookings.bind_session(booking.id, session.id).await?;

        Ok(CheckoutStarted {
            booking,
            checkout_url: session.checkout_url,
        })
    }

    /// Settle a booking from the provider's success callback.
    ///
    /// Order of operations: load and match the booking, verify payment with
    /// the provider, replay-guard on the stored status, then take inventory
    /// and record the terminal transition. A unit taken by a call that does
    /// not end up owning the confirmation is returned to the ledger.
    #[instrument(
        skip(self, booking_id, session_id),
        fields(booking_id = %booking_id, session = %session_id),
        err
    )]
    pub async fn confirm(
        &self,
        booking_id: BookingId,
        session_id: &ProviderSessionId,
    ) -> Result<ConfirmationOutcome, ConfirmationError> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(ConfirmationError::UnknownBooking(booking_id))?;

        match booking.provider_session_id.as_ref() {
            Some(bound) if bound == session_id => {}
            _ => return Err(ConfirmationError::SessionMismatch(booking_id)),
        }

        let status = self.verifier.verify(session_id).await?;

        // Replay guard: once settled, the stored outcome wins no matter
        // what the provider reports on later callbacks.
        if booking.is_terminal() {
            return Ok(stored_outcome(booking));
        }

        if !status.is_paid() {
            let transition = self
                .bookings
                .fail(booking_id, FailureReason::NotPaid)
                .await?;
            return Ok(match transition {
                Transition::Applied(b) => ConfirmationOutcome::NotPaid(b),
                Transition::AlreadyTerminal(b) => stored_outcome(b),
            });
        }

        if !self
            .ledger
            .try_decrement(booking.room_id, booking.date)
            .await?
        {
            let transition = self
                .bookings
                .fail(booking_id, FailureReason::SoldOut)
                .await?;
            return Ok(match transition {
                Transition::Applied(b) => ConfirmationOutcome::SoldOut(b),
                Transition::AlreadyTerminal(b) => stored_outcome(b),
            });
        }

        // One unit is now held for this booking. Every path below that does
        // not end in `Applied` must give it back.
        match self.bookings.confirm(booking_id).await {
            Ok(Transition::Applied(b)) => {
                self.queue_confirmation_mail(&b);
                Ok(ConfirmationOutcome::Confirmed(b))
            }
            Ok(Transition::AlreadyTerminal(b)) => {
                // A concurrent callback settled the booking between our
                // status read and this transition. Whatever it decided, the
                // unit this call took is surplus.
                self.release_unit(booking.room_id, booking.date).await;
                Ok(stored_outcome(b))
            }
            Err(e) => {
                self.release_unit(booking.room_id, booking.date).await;
                Err(e.into())
            }
        }
    }

    async fn release_unit(&self, room_id: RoomId, date: NaiveDate) {
        if let Err(e) = self.ledger.increment(room_id, date).await {
            error!(%room_id, %date, error = %e, "failed to return a reserved unit to the ledger");
        }
    }

    /// Queue the confirmation mail, best effort. A broker outage must not
    /// fail (or undo) an already-confirmed booking.
    fn queue_confirmation_mail(&self, booking: &Booking) {
        let request = NotificationRequest::new(
            booking.guest_email.clone(),
            "Booking confirmed",
            format!(
                "Your booking #{} for {} is confirmed. We look forward to hosting you.",
                booking.id, booking.date
            ),
        );

        match request.to_json() {
            Ok(payload) => {
                if let Err(e) = self.notifications.publish(NOTIFICATIONS_TOPIC, payload) {
                    warn!(booking_id = %booking.id, error = %e, "confirmation mail not queued");
                }
            }
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "confirmation mail not encodable")
            }
        }
    }
}

fn stored_outcome(booking: Booking) -> ConfirmationOutcome {
    match booking.status {
        BookingStatus::Confirmed => ConfirmationOutcome::Confirmed(booking),
        BookingStatus::Failed => match booking.failure_reason {
            Some(FailureReason::SoldOut) => ConfirmationOutcome::SoldOut(booking),
            Some(FailureReason::NotPaid) | None => ConfirmationOutcome::NotPaid(booking),
        },
        BookingStatus::Pending => unreachable!("stored outcome requested for a pending booking"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use stayforge_availability::InMemoryAvailabilityLedger;
    use stayforge_catalog::{InMemoryCatalogStore, NewProperty, NewRoom, Room};
    use stayforge_messaging::{BusError, GroupConsumer, InMemoryBroker};
    use stayforge_payments::{MockCheckoutProvider, PaymentStatus, ProviderSession};

    use crate::store::InMemoryBookingStore;

    use super::*;

    const DATE: &str = "2025-07-14";

    fn date() -> NaiveDate {
        DATE.parse().unwrap()
    }

    fn guest() -> EmailAddress {
        "guest@example.com".parse().unwrap()
    }

    struct World {
        catalog: Arc<InMemoryCatalogStore>,
        bookings: Arc<InMemoryBookingStore>,
        ledger: Arc<InMemoryAvailabilityLedger>,
        broker: InMemoryBroker,
        room: Room,
    }

    impl World {
        /// One property with one room, with `capacity` units open on the
        /// test date.
        async fn with_capacity(capacity: u32) -> Self {
            let ledger = Arc::new(InMemoryAvailabilityLedger::new());
            let catalog = Arc::new(InMemoryCatalogStore::new(ledger.clone()));
            let bookings = Arc::new(InMemoryBookingStore::new());
            let broker = InMemoryBroker::new();

            let listing = catalog
                .register(NewProperty {
                    name: "Seaside Villa".to_string(),
                    city: "Goa".to_string(),
                    area: "Anjuna".to_string(),
                    state: "Goa".to_string(),
                    beds: 2,
                    bathrooms: 1,
                    guests_allowed: 4,
                    contact_email: "host@example.com".parse().unwrap(),
                    rooms: vec![NewRoom {
                        room_type: "Deluxe".to_string(),
                        base_price_cents: 12_900,
                    }],
                })
                .await
                .unwrap();
            let room = listing.rooms[0].clone();

            ledger.open(room.id, date(), capacity).await.unwrap();

            Self {
                catalog,
                bookings,
                ledger,
                broker,
                room,
            }
        }

        fn orchestrator(&self, verifier: Arc<dyn PaymentVerifier>) -> BookingOrchestrator {
            self.orchestrator_with(
                verifier,
                Arc::new(MockCheckoutProvider::new()),
                self.bookings.clone(),
                Arc::new(self.broker.clone()),
            )
        }

        fn orchestrator_with(
            &self,
            verifier: Arc<dyn PaymentVerifier>,
            gateway: Arc<dyn CheckoutGateway>,
            bookings: Arc<dyn BookingStore>,
            notifications: Arc<dyn MessageBus>,
        ) -> BookingOrchestrator {
            BookingOrchestrator::new(
                self.catalog.clone(),
                bookings,
                self.ledger.clone(),
                gateway,
                verifier,
                notifications,
                CheckoutConfig::default(),
            )
        }

        async fn available(&self) -> u32 {
            self.ledger
                .entry(self.room.id, date())
                .await
                .unwrap()
                .expect("entry open")
                .available
        }

        fn mail_probe(&self) -> Box<dyn GroupConsumer> {
            self.broker
                .subscribe(NOTIFICATIONS_TOPIC, "probe", "probe-1")
                .unwrap()
        }
    }

    fn paid() -> Arc<dyn PaymentVerifier> {
        Arc::new(StaticVerifier(PaymentStatus::Paid))
    }

    fn unpaid() -> Arc<dyn PaymentVerifier> {
        Arc::new(StaticVerifier(PaymentStatus::Unpaid))
    }

    async fn checked_out(world: &World, orchestrator: &BookingOrchestrator) -> Booking {
        orchestrator
            .begin_checkout(BeginCheckout {
                room_id: world.room.id,
                date: date(),
                guest_email: guest(),
            })
            .await
            .unwrap()
            .booking
    }

    fn bound_session(booking: &Booking) -> ProviderSessionId {
        booking.provider_session_id.clone().expect("session bound")
    }

    struct StaticVerifier(PaymentStatus);

    #[async_trait]
    impl PaymentVerifier for StaticVerifier {
        async fn verify(
            &self,
            _session: &ProviderSessionId,
        ) -> Result<PaymentStatus, PaymentError> {
            Ok(self.0)
        }
    }

    struct OutageVerifier;

    #[async_trait]
    impl PaymentVerifier for OutageVerifier {
        async fn verify(
            &self,
            _session: &ProviderSessionId,
        ) -> Result<PaymentStatus, PaymentError> {
            Err(PaymentError::Network("connect timeout".to_string()))
        }
    }

    struct RejectingGateway;

    #[async_trait]
    impl CheckoutGateway for RejectingGateway {
        async fn create_session(
            &self,
            _request: &CheckoutSessionRequest,
        ) -> Result<ProviderSession, PaymentError> {
            Err(PaymentError::Api {
                status: 400,
                detail: "invalid api key".to_string(),
            })
        }
    }

    /// Remembers the last session request so tests can inspect callback
    /// URLs and pricing.
    struct RecordingGateway {
        inner: MockCheckoutProvider,
        last: Mutex<Option<CheckoutSessionRequest>>,
    }

    impl RecordingGateway {
        fn new() -> Self {
            Self {
                inner: MockCheckoutProvider::new(),
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl CheckoutGateway for RecordingGateway {
        async fn create_session(
            &self,
            request: &CheckoutSessionRequest,
        ) -> Result<ProviderSession, PaymentError> {
            *self.last.lock().unwrap() = Some(request.clone());
            self.inner.create_session(request).await
        }
    }

    /// Booking store whose `confirm` always blows up, for compensation
    /// tests. Everything else is delegated.
    struct BrokenConfirmStore {
        inner: Arc<InMemoryBookingStore>,
    }

    #[async_trait]
    impl BookingStore for BrokenConfirmStore {
        async fn create(&self, new: NewBooking) -> Result<Booking, BookingStoreError> {
            self.inner.create(new).await
        }

        async fn bind_session(
            &self,
            id: BookingId,
            session: ProviderSessionId,
        ) -> Result<Booking, BookingStoreError> {
            self.inner.bind_session(id, session).await
        }

        async fn get(&self, id: BookingId) -> Result<Option<Booking>, BookingStoreError> {
            self.inner.get(id).await
        }

        async fn confirm(&self, _id: BookingId) -> Result<Transition, BookingStoreError> {
            Err(BookingStoreError::Backend("write failed".to_string()))
        }

        async fn fail(
            &self,
            id: BookingId,
            reason: FailureReason,
        ) -> Result<Transition, BookingStoreError> {
            self.inner.fail(id, reason).await
        }
    }

    struct DeadBus;

    impl MessageBus for DeadBus {
        fn publish(&self, _topic: &str, _payload: String) -> Result<String, BusError> {
            Err(BusError::Backend("broker down".to_string()))
        }

        fn subscribe(
            &self,
            _topic: &str,
            _group: &str,
            _consumer: &str,
        ) -> Result<Box<dyn GroupConsumer>, BusError> {
            Err(BusError::Backend("broker down".to_string()))
        }
    }

    #[tokio::test]
    async fn begin_checkout_prices_the_room_and_binds_the_session() {
        let world = World::with_capacity(3).await;
        let gateway = Arc::new(RecordingGateway::new());
        let orchestrator = world.orchestrator_with(
            paid(),
            gateway.clone(),
            world.bookings.clone(),
            Arc::new(world.broker.clone()),
        );

        let started = orchestrator
            .begin_checkout(BeginCheckout {
                room_id: world.room.id,
                date: date(),
                guest_email: guest(),
            })
            .await
            .unwrap();

        assert_eq!(started.booking.status, BookingStatus::Pending);
        assert_eq!(started.booking.amount_cents, 12_900);
        assert!(started.booking.provider_session_id.is_some());
        assert!(started.checkout_url.contains("checkout.invalid"));

        let request = gateway.last.lock().unwrap().clone().expect("request sent");
        assert_eq!(request.product_name, "Seaside Villa (Deluxe)");
        assert_eq!(request.currency, "usd");
        assert!(request.success_url.contains("{CHECKOUT_SESSION_ID}"));
        assert!(request
            .success_url
            .contains(&format!("booking_id={}", started.booking.id)));

        // Starting checkout must not touch inventory.
        assert_eq!(world.available().await, 3);
    }

    #[tokio::test]
    async fn begin_checkout_for_unknown_room_is_rejected() {
        let world = World::with_capacity(1).await;
        let orchestrator = world.orchestrator(paid());

        let result = orchestrator
            .begin_checkout(BeginCheckout {
                room_id: RoomId::new(999),
                date: date(),
                guest_email: guest(),
            })
            .await;

        match result {
            Err(CheckoutError::UnknownRoom(id)) => assert_eq!(id, RoomId::new(999)),
            other => panic!("expected UnknownRoom, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn begin_checkout_surfaces_provider_rejection() {
        let world = World::with_capacity(1).await;
        let orchestrator = world.orchestrator_with(
            paid(),
            Arc::new(RejectingGateway),
            world.bookings.clone(),
            Arc::new(world.broker.clone()),
        );

        let result = orchestrator
            .begin_checkout(BeginCheckout {
                room_id: world.room.id,
                date: date(),
                guest_email: guest(),
            })
            .await;

        assert!(matches!(result, Err(CheckoutError::Provider(_))));
    }

    #[tokio::test]
    async fn paid_callback_confirms_takes_inventory_and_queues_mail() {
        let world = World::with_capacity(3).await;
        let orchestrator = world.orchestrator(paid());
        let booking = checked_out(&world, &orchestrator).await;

        let outcome = orchestrator
            .confirm(booking.id, &bound_session(&booking))
            .await
            .unwrap();

        match outcome {
            ConfirmationOutcome::Confirmed(b) => {
                assert_eq!(b.status, BookingStatus::Confirmed);
                assert!(b.failure_reason.is_none());
            }
            other => panic!("expected Confirmed, got {other:?}"),
        }
        assert_eq!(world.available().await, 2);

        let mut probe = world.mail_probe();
        let delivery = probe
            .recv_timeout(Duration::from_millis(100))
            .unwrap()
            .expect("confirmation mail queued");
        let mail = NotificationRequest::from_json(&delivery.payload).unwrap();
        assert_eq!(mail.to, guest());
        assert_eq!(mail.subject, "Booking confirmed");
        assert!(mail.body.contains(&booking.id.to_string()));
        assert!(mail.body.contains(DATE));
    }

    #[tokio::test]
    async fn unpaid_session_fails_the_booking_without_touching_inventory() {
        let world = World::with_capacity(2).await;
        let orchestrator = world.orchestrator(unpaid());
        let booking = checked_out(&world, &orchestrator).await;

        let outcome = orchestrator
            .confirm(booking.id, &bound_session(&booking))
            .await
            .unwrap();

        match outcome {
            ConfirmationOutcome::NotPaid(b) => {
                assert_eq!(b.status, BookingStatus::Failed);
                assert_eq!(b.failure_reason, Some(FailureReason::NotPaid));
            }
            other => panic!("expected NotPaid, got {other:?}"),
        }
        assert_eq!(world.available().await, 2);

        let mut probe = world.mail_probe();
        assert!(probe
            .recv_timeout(Duration::from_millis(50))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn sold_out_date_fails_the_late_booking() {
        let world = World::with_capacity(1).await;
        let orchestrator = world.orchestrator(paid());

        let first = checked_out(&world, &orchestrator).await;
        let second = checked_out(&world, &orchestrator).await;

        let outcome = orchestrator
            .confirm(first.id, &bound_session(&first))
            .await
            .unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Confirmed(_)));
        assert_eq!(world.available().await, 0);

        let outcome = orchestrator
            .confirm(second.id, &bound_session(&second))
            .await
            .unwrap();
        match outcome {
            ConfirmationOutcome::SoldOut(b) => {
                assert_eq!(b.status, BookingStatus::Failed);
                assert_eq!(b.failure_reason, Some(FailureReason::SoldOut));
            }
            other => panic!("expected SoldOut, got {other:?}"),
        }

        // The count bottoms out at zero and the first booking stays
        // confirmed.
        assert_eq!(world.available().await, 0);
        let stored = world.bookings.get(first.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn replaying_a_confirmed_callback_is_stable() {
        let world = World::with_capacity(2).await;
        let orchestrator = world.orchestrator(paid());
        let booking = checked_out(&world, &orchestrator).await;
        let session = bound_session(&booking);

        let first = orchestrator.confirm(booking.id, &session).await.unwrap();
        let replay = orchestrator.confirm(booking.id, &session).await.unwrap();

        assert!(matches!(first, ConfirmationOutcome::Confirmed(_)));
        assert!(matches!(replay, ConfirmationOutcome::Confirmed(_)));

        // Inventory was taken once and the mail queued once.
        assert_eq!(world.available().await, 1);
        let mut probe = world.mail_probe();
        assert!(probe
            .recv_timeout(Duration::from_millis(100))
            .unwrap()
            .is_some());
        assert!(probe
            .recv_timeout(Duration::from_millis(50))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn replaying_a_failed_callback_returns_the_stored_outcome() {
        let world = World::with_capacity(2).await;
        let orchestrator = world.orchestrator(unpaid());
        let booking = checked_out(&world, &orchestrator).await;
        let session = bound_session(&booking);

        let first = orchestrator.confirm(booking.id, &session).await.unwrap();
        assert!(matches!(first, ConfirmationOutcome::NotPaid(_)));

        // Even if the provider would now report the session paid, the
        // stored outcome wins.
        let retry_orchestrator = world.orchestrator(paid());
        let replay = retry_orchestrator
            .confirm(booking.id, &session)
            .await
            .unwrap();
        assert!(matches!(replay, ConfirmationOutcome::NotPaid(_)));
        assert_eq!(world.available().await, 2);
    }

    #[tokio::test]
    async fn provider_outage_leaves_the_booking_pending_and_retryable() {
        let world = World::with_capacity(2).await;
        let orchestrator = world.orchestrator(Arc::new(OutageVerifier));
        let booking = checked_out(&world, &orchestrator).await;
        let session = bound_session(&booking);

        let result = orchestrator.confirm(booking.id, &session).await;
        assert!(matches!(result, Err(ConfirmationError::Provider(_))));

        let stored = world.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        assert_eq!(world.available().await, 2);

        // Once the provider is reachable again the same callback settles
        // the booking.
        let retry_orchestrator = world.orchestrator(paid());
        let outcome = retry_orchestrator
            .confirm(booking.id, &session)
            .await
            .unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Confirmed(_)));
        assert_eq!(world.available().await, 1);
    }

    #[tokio::test]
    async fn confirm_failure_after_decrement_returns_the_unit() {
        let world = World::with_capacity(2).await;
        let broken = Arc::new(BrokenConfirmStore {
            inner: world.bookings.clone(),
        });
        let orchestrator = world.orchestrator_with(
            paid(),
            Arc::new(MockCheckoutProvider::new()),
            broken,
            Arc::new(world.broker.clone()),
        );
        let booking = checked_out(&world, &orchestrator).await;

        let result = orchestrator
            .confirm(booking.id, &bound_session(&booking))
            .await;
        assert!(matches!(result, Err(ConfirmationError::Store(_))));

        // The taken unit came back and the booking is still pending.
        assert_eq!(world.available().await, 2);
        let stored = world.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn mismatched_session_touches_nothing() {
        let world = World::with_capacity(2).await;
        let orchestrator = world.orchestrator(paid());
        let booking = checked_out(&world, &orchestrator).await;

        let foreign = ProviderSessionId::new("cs_someone_elses").unwrap();
        let result = orchestrator.confirm(booking.id, &foreign).await;

        match result {
            Err(ConfirmationError::SessionMismatch(id)) => assert_eq!(id, booking.id),
            other => panic!("expected SessionMismatch, got {other:?}"),
        }
        let stored = world.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        assert_eq!(world.available().await, 2);
    }

    #[tokio::test]
    async fn unknown_booking_is_reported() {
        let world = World::with_capacity(1).await;
        let orchestrator = world.orchestrator(paid());

        let session = ProviderSessionId::new("cs_test_lost").unwrap();
        let result = orchestrator.confirm(BookingId::new(404), &session).await;

        match result {
            Err(ConfirmationError::UnknownBooking(id)) => assert_eq!(id, BookingId::new(404)),
            other => panic!("expected UnknownBooking, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broker_outage_does_not_unconfirm_the_booking() {
        let world = World::with_capacity(2).await;
        let orchestrator = world.orchestrator_with(
            paid(),
            Arc::new(MockCheckoutProvider::new()),
            world.bookings.clone(),
            Arc::new(DeadBus),
        );
        let booking = checked_out(&world, &orchestrator).await;

        let outcome = orchestrator
            .confirm(booking.id, &bound_session(&booking))
            .await
            .unwrap();

        assert!(matches!(outcome, ConfirmationOutcome::Confirmed(_)));
        let stored = world.bookings.get(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(world.available().await, 1);
    }
}

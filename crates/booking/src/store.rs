//! Booking store contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use stayforge_core::{BookingId, ProviderSessionId};

use crate::booking::{Booking, BookingStatus, FailureReason, NewBooking};

/// Booking store operation error.
#[derive(Debug, Error)]
pub enum BookingStoreError {
    #[error("booking {0} not found")]
    NotFound(BookingId),

    #[error("storage failure: {0}")]
    Backend(String),
}

/// Result of asking for a terminal transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// This call moved the booking out of `Pending`.
    Applied(Booking),
    /// The booking was already terminal. The stored record is returned
    /// unchanged; the caller must honor it instead of its own intent.
    AlreadyTerminal(Booking),
}

/// Store of booking records.
///
/// `confirm` and `fail` are the only paths out of `Pending`, and they must
/// be atomic check-and-set operations: under concurrent calls, exactly one
/// gets `Applied` and every other caller sees `AlreadyTerminal`.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert a pending booking, assigning its id.
    async fn create(&self, new: NewBooking) -> Result<Booking, BookingStoreError>;

    /// Attach the checkout session issued for this booking. Called once,
    /// right after `create`.
    async fn bind_session(
        &self,
        id: BookingId,
        session: ProviderSessionId,
    ) -> Result<Booking, BookingStoreError>;

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, BookingStoreError>;

    /// Move a pending booking to `Confirmed`.
    async fn confirm(&self, id: BookingId) -> Result<Transition, BookingStoreError>;

    /// Move a pending booking to `Failed` with the given reason.
    async fn fail(
        &self,
        id: BookingId,
        reason: FailureReason,
    ) -> Result<Transition, BookingStoreError>;
}

#[async_trait]
impl<S> BookingStore for Arc<S>
where
    S: BookingStore + ?Sized,
{
    async fn create(&self, new: NewBooking) -> Result<Booking, BookingStoreError> {
        (**self).create(new).await
    }

    async fn bind_session(
        &self,
        id: BookingId,
        session: ProviderSessionId,
    ) -> Result<Booking, BookingStoreError> {
        (**self).bind_session(id, session).await
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, BookingStoreError> {
        (**self).get(id).await
    }

    async fn confirm(&self, id: BookingId) -> Result<Transition, BookingStoreError> {
        (**self).confirm(id).await
    }

    async fn fail(
        &self,
        id: BookingId,
        reason: FailureReason,
    ) -> Result<Transition, BookingStoreError> {
        (**self).fail(id, reason).await
    }
}

/// In-memory booking store.
///
/// Terminal transitions hold the write lock across the status check and the
/// update, which gives the same exactly-once guarantee the Postgres store
/// gets from a status-guarded `UPDATE`.
pub struct InMemoryBookingStore {
    next_id: AtomicI64,
    bookings: RwLock<HashMap<BookingId, Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            bookings: RwLock::new(HashMap::new()),
        }
    }

    fn transition(
        &self,
        id: BookingId,
        apply: impl FnOnce(&mut Booking),
    ) -> Result<Transition, BookingStoreError> {
        let mut bookings = self
            .bookings
            .write()
            .map_err(|_| BookingStoreError::Backend("lock poisoned".to_string()))?;
        let booking = bookings
            .get_mut(&id)
            .ok_or(BookingStoreError::NotFound(id))?;

        if booking.is_terminal() {
            return Ok(Transition::AlreadyTerminal(booking.clone()));
        }

        apply(booking);
        booking.updated_at = Utc::now();
        Ok(Transition::Applied(booking.clone()))
    }
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn create(&self, new: NewBooking) -> Result<Booking, BookingStoreError> {
        let id = BookingId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let booking = Booking {
            id,
            room_id: new.room_id,
            date: new.date,
            guest_email: new.guest_email,
            amount_cents: new.amount_cents,
            provider_session_id: None,
            status: BookingStatus::Pending,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        let mut bookings = self
            .bookings
            .write()
            .map_err(|_| BookingStoreError::Backend("lock poisoned".to_string()))?;
        bookings.insert(id, booking.clone());
        Ok(booking)
    }

    async fn bind_session(
        &self,
        id: BookingId,
        session: ProviderSessionId,
    ) -> Result<Booking, BookingStoreError> {
        let mut bookings = self
            .bookings
            .write()
            .map_err(|_| BookingStoreError::Backend("lock poisoned".to_string()))?;
        let booking = bookings
            .get_mut(&id)
            .ok_or(BookingStoreError::NotFound(id))?;

        booking.provider_session_id = Some(session);
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, BookingStoreError> {
        let bookings = self
            .bookings
            .read()
            .map_err(|_| BookingStoreError::Backend("lock poisoned".to_string()))?;
        Ok(bookings.get(&id).cloned())
    }

    async fn confirm(&self, id: BookingId) -> Result<Transition, BookingStoreError> {
        self.transition(id, |booking| {
            booking.status = BookingStatus::Confirmed;
        })
    }

    async fn fail(
        &self,
        id: BookingId,
        reason: FailureReason,
    ) -> Result<Transition, BookingStoreError> {
        self.transition(id, |booking| {
            booking.status = BookingStatus::Failed;
            booking.failure_reason = Some(reason);
        })
    }
}

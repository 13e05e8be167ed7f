//! Postgres-backed booking store.
//!
//! Terminal transitions are status-guarded updates: `confirm` and `fail`
//! only touch rows still in `pending`, so concurrent settlement attempts
//! serialize on the row and exactly one applies.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use stayforge_booking::{
    Booking, BookingStatus, BookingStore, BookingStoreError, FailureReason, NewBooking, Transition,
};
use stayforge_core::{BookingId, EmailAddress, ProviderSessionId, RoomId};

const BOOKING_COLUMNS: &str = "id, room_id, date, guest_email, amount_cents, \
     provider_session_id, status, failure_reason, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresBookingStore {
    pool: Arc<PgPool>,
}

impl PostgresBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn backend(operation: &str, e: impl core::fmt::Display) -> BookingStoreError {
    BookingStoreError::Backend(format!("{operation}: {e}"))
}

fn status_label(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Pending => "pending",
        BookingStatus::Confirmed => "confirmed",
        BookingStatus::Failed => "failed",
    }
}

fn status_from_label(label: &str) -> Result<BookingStatus, BookingStoreError> {
    match label {
        "pending" => Ok(BookingStatus::Pending),
        "confirmed" => Ok(BookingStatus::Confirmed),
        "failed" => Ok(BookingStatus::Failed),
        other => Err(backend("status", format!("unknown status {other:?}"))),
    }
}

fn reason_label(reason: FailureReason) -> &'static str {
    match reason {
        FailureReason::NotPaid => "not_paid",
        FailureReason::SoldOut => "sold_out",
    }
}

fn reason_from_label(label: &str) -> Result<FailureReason, BookingStoreError> {
    match label {
        "not_paid" => Ok(FailureReason::NotPaid),
        "sold_out" => Ok(FailureReason::SoldOut),
        other => Err(backend("failure_reason", format!("unknown reason {other:?}"))),
    }
}

fn booking_from_row(row: &PgRow) -> Result<Booking, BookingStoreError> {
    let guest_email: String = row.try_get("guest_email").map_err(|e| backend("row", e))?;
    let session: Option<String> = row
        .try_get("provider_session_id")
        .map_err(|e| backend("row", e))?;
    let status: String = row.try_get("status").map_err(|e| backend("row", e))?;
    let reason: Option<String> = row
        .try_get("failure_reason")
        .map_err(|e| backend("row", e))?;

    Ok(Booking {
        id: BookingId::new(row.try_get("id").map_err(|e| backend("row", e))?),
        room_id: RoomId::new(row.try_get("room_id").map_err(|e| backend("row", e))?),
        date: row.try_get("date").map_err(|e| backend("row", e))?,
        guest_email: EmailAddress::new(guest_email).map_err(|e| backend("row", e))?,
        amount_cents: row
            .try_get::<i64, _>("amount_cents")
            .map_err(|e| backend("row", e))? as u64,
        provider_session_id: session
            .map(ProviderSessionId::new)
            .transpose()
            .map_err(|e| backend("row", e))?,
        status: status_from_label(&status)?,
        failure_reason: reason.as_deref().map(reason_from_label).transpose()?,
        created_at: row.try_get("created_at").map_err(|e| backend("row", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| backend("row", e))?,
    })
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    #[instrument(skip(self, new), fields(room_id = %new.room_id, date = %new.date), err)]
    async fn create(&self, new: NewBooking) -> Result<Booking, BookingStoreError> {
        let sql = format!(
            "INSERT INTO bookings (room_id, date, guest_email, amount_cents) \
             VALUES ($1, $2, $3, $4) RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new.room_id.as_i64())
            .bind(new.date)
            .bind(new.guest_email.as_str())
            .bind(new.amount_cents as i64)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| backend("create", e))?;

        booking_from_row(&row)
    }

    #[instrument(skip(self, session), fields(booking_id = %id), err)]
    async fn bind_session(
        &self,
        id: BookingId,
        session: ProviderSessionId,
    ) -> Result<Booking, BookingStoreError> {
        let sql = format!(
            "UPDATE bookings SET provider_session_id = $2, updated_at = now() \
             WHERE id = $1 RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(session.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| backend("bind_session", e))?
            .ok_or(BookingStoreError::NotFound(id))?;

        booking_from_row(&row)
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, BookingStoreError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| backend("get", e))?;

        row.as_ref().map(booking_from_row).transpose()
    }

    #[instrument(skip(self), fields(booking_id = %id), err)]
    async fn confirm(&self, id: BookingId) -> Result<Transition, BookingStoreError> {
        let sql = format!(
            "UPDATE bookings SET status = $2, updated_at = now() \
             WHERE id = $1 AND status = 'pending' RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(status_label(BookingStatus::Confirmed))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| backend("confirm", e))?;

        match row {
            Some(row) => Ok(Transition::Applied(booking_from_row(&row)?)),
            None => self.settled(id).await,
        }
    }

    #[instrument(skip(self), fields(booking_id = %id, reason = reason_label(reason)), err)]
    async fn fail(
        &self,
        id: BookingId,
        reason: FailureReason,
    ) -> Result<Transition, BookingStoreError> {
        let sql = format!(
            "UPDATE bookings SET status = $2, failure_reason = $3, updated_at = now() \
             WHERE id = $1 AND status = 'pending' RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .bind(status_label(BookingStatus::Failed))
            .bind(reason_label(reason))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| backend("fail", e))?;

        match row {
            Some(row) => Ok(Transition::Applied(booking_from_row(&row)?)),
            None => self.settled(id).await,
        }
    }
}

impl PostgresBookingStore {
    /// A guarded update found no pending row: either the booking does not
    /// exist, or it already settled and the stored record wins.
    async fn settled(&self, id: BookingId) -> Result<Transition, BookingStoreError> {
        let stored = self
            .get(id)
            .await?
            .ok_or(BookingStoreError::NotFound(id))?;
        Ok(Transition::AlreadyTerminal(stored))
    }
}

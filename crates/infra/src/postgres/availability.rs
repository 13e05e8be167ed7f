//! Postgres-backed availability ledger.
//!
//! The decrement is a single guarded `UPDATE`, so correctness rides on
//! row-level locking: two callbacks racing for the last unit serialize on
//! the `(room_id, date)` row and exactly one of them sees an affected row.
//! No table locks, no advisory locks, no read-then-write window.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::instrument;

use stayforge_availability::{AvailabilityLedger, LedgerError, RoomAvailability};
use stayforge_core::RoomId;

#[derive(Debug, Clone)]
pub struct PostgresAvailabilityLedger {
    pool: Arc<PgPool>,
}

impl PostgresAvailabilityLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn backend(operation: &str, e: sqlx::Error) -> LedgerError {
    LedgerError::Backend(format!("{operation}: {e}"))
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<RoomAvailability, LedgerError> {
    Ok(RoomAvailability {
        room_id: RoomId::new(row.try_get("room_id").map_err(|e| backend("row", e))?),
        date: row.try_get("date").map_err(|e| backend("row", e))?,
        available: row
            .try_get::<i32, _>("available")
            .map_err(|e| backend("row", e))? as u32,
        capacity: row
            .try_get::<i32, _>("capacity")
            .map_err(|e| backend("row", e))? as u32,
    })
}

#[async_trait]
impl AvailabilityLedger for PostgresAvailabilityLedger {
    #[instrument(skip(self), fields(room_id = %room_id, date = %date), err)]
    async fn open(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        capacity: u32,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO room_availability (room_id, date, capacity, available)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (room_id, date)
            DO UPDATE SET capacity = EXCLUDED.capacity, available = EXCLUDED.available
            "#,
        )
        .bind(room_id.as_i64())
        .bind(date)
        .bind(capacity as i32)
        .execute(&*self.pool)
        .await
        .map_err(|e| backend("open", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(room_id = %room_id, date = %date), err)]
    async fn try_decrement(&self, room_id: RoomId, date: NaiveDate) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE room_availability
            SET available = available - 1
            WHERE room_id = $1 AND date = $2 AND available > 0
            "#,
        )
        .bind(room_id.as_i64())
        .bind(date)
        .execute(&*self.pool)
        .await
        .map_err(|e| backend("try_decrement", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(room_id = %room_id, date = %date), err)]
    async fn increment(&self, room_id: RoomId, date: NaiveDate) -> Result<u32, LedgerError> {
        let row = sqlx::query(
            r#"
            UPDATE room_availability
            SET available = LEAST(available + 1, capacity)
            WHERE room_id = $1 AND date = $2
            RETURNING available
            "#,
        )
        .bind(room_id.as_i64())
        .bind(date)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| backend("increment", e))?
        .ok_or(LedgerError::MissingEntry { room_id, date })?;

        Ok(row
            .try_get::<i32, _>("available")
            .map_err(|e| backend("increment", e))? as u32)
    }

    async fn entry(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Option<RoomAvailability>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT room_id, date, available, capacity
            FROM room_availability
            WHERE room_id = $1 AND date = $2
            "#,
        )
        .bind(room_id.as_i64())
        .bind(date)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| backend("entry", e))?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn calendar(&self, room_id: RoomId) -> Result<Vec<RoomAvailability>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT room_id, date, available, capacity
            FROM room_availability
            WHERE room_id = $1
            ORDER BY date ASC
            "#,
        )
        .bind(room_id.as_i64())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| backend("calendar", e))?;

        rows.iter().map(entry_from_row).collect()
    }
}

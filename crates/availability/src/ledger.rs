//! Ledger contract and record types.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stayforge_core::RoomId;

/// One calendar entry of sellable inventory.
///
/// Invariant: `available <= capacity`. The count never goes below zero;
/// a failed decrement is reported as `false`, not as a negative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAvailability {
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub available: u32,
    pub capacity: u32,
}

impl RoomAvailability {
    pub fn is_sold_out(&self) -> bool {
        self.available == 0
    }
}

/// Ledger operation error.
///
/// Sold-out is deliberately absent: running out of inventory is a normal
/// outcome carried in the `try_decrement` return value.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No calendar entry exists for the key. Only raised by `increment`,
    /// where a missing entry means the compensation is aimed at the wrong
    /// place.
    #[error("no availability entry for room {room_id} on {date}")]
    MissingEntry { room_id: RoomId, date: NaiveDate },

    #[error("storage failure: {0}")]
    Backend(String),
}

/// Per-room, per-date inventory with atomic reservation semantics.
///
/// Operations on one `(room, date)` key are linearizable: concurrent
/// decrements observe each other and the count cannot be taken below zero.
/// Implementations must not funnel unrelated keys through a single lock;
/// contention on one date must leave other rooms and dates unaffected.
#[async_trait]
pub trait AvailabilityLedger: Send + Sync {
    /// Open (or reset) a calendar entry with `capacity` units for sale.
    async fn open(&self, room_id: RoomId, date: NaiveDate, capacity: u32)
    -> Result<(), LedgerError>;

    /// Atomically take one unit. `false` means the entry is sold out (or
    /// was never opened) and nothing was changed. Never goes negative.
    async fn try_decrement(&self, room_id: RoomId, date: NaiveDate) -> Result<bool, LedgerError>;

    /// Return one unit, clamped at the recorded capacity. Returns the
    /// available count after the operation.
    async fn increment(&self, room_id: RoomId, date: NaiveDate) -> Result<u32, LedgerError>;

    /// Read a single calendar entry.
    async fn entry(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Option<RoomAvailability>, LedgerError>;

    /// Read all calendar entries for a room, ordered by date.
    async fn calendar(&self, room_id: RoomId) -> Result<Vec<RoomAvailability>, LedgerError>;
}

#[async_trait]
impl<L> AvailabilityLedger for Arc<L>
where
    L: AvailabilityLedger + ?Sized,
{
    async fn open(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        capacity: u32,
    ) -> Result<(), LedgerError> {
        (**self).open(room_id, date, capacity).await
    }

    async fn try_decrement(&self, room_id: RoomId, date: NaiveDate) -> Result<bool, LedgerError> {
        (**self).try_decrement(room_id, date).await
    }

    async fn increment(&self, room_id: RoomId, date: NaiveDate) -> Result<u32, LedgerError> {
        (**self).increment(room_id, date).await
    }

    async fn entry(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Option<RoomAvailability>, LedgerError> {
        (**self).entry(room_id, date).await
    }

    async fn calendar(&self, room_id: RoomId) -> Result<Vec<RoomAvailability>, LedgerError> {
        (**self).calendar(room_id).await
    }
}

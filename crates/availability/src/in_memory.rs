//! In-memory ledger implementation.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;

use stayforge_core::RoomId;

use crate::ledger::{AvailabilityLedger, LedgerError, RoomAvailability};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    room_id: RoomId,
    date: NaiveDate,
}

#[derive(Debug)]
struct Slot {
    available: u32,
    capacity: u32,
}

/// In-memory ledger with one mutex per `(room, date)` entry.
///
/// The outer map is read-locked on the hot path and write-locked only when
/// a new entry is opened, so decrements on different keys never contend.
/// Intended for tests/dev; the Postgres ledger is the durable one.
#[derive(Debug, Default)]
pub struct InMemoryAvailabilityLedger {
    slots: RwLock<HashMap<SlotKey, Arc<Mutex<Slot>>>>,
}

impl InMemoryAvailabilityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reset) a calendar entry with `capacity` units for sale.
    pub fn open(&self, room_id: RoomId, date: NaiveDate, capacity: u32) -> Result<(), LedgerError> {
        let key = SlotKey { room_id, date };
        let mut slots = self
            .slots
            .write()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;

        match slots.entry(key) {
            Entry::Occupied(occupied) => {
                let mut slot = occupied
                    .get()
                    .lock()
                    .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;
                slot.available = capacity;
                slot.capacity = capacity;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Mutex::new(Slot {
                    available: capacity,
                    capacity,
                })));
            }
        }
        Ok(())
    }

    /// Atomically take one unit. `false` = sold out or never opened.
    pub fn try_decrement(&self, room_id: RoomId, date: NaiveDate) -> Result<bool, LedgerError> {
        let Some(slot) = self.slot(room_id, date)? else {
            return Ok(false);
        };
        let mut slot = slot
            .lock()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;
        if slot.available == 0 {
            return Ok(false);
        }
        slot.available -= 1;
        Ok(true)
    }

    /// Return one unit, clamped at capacity. Returns the new count.
    pub fn increment(&self, room_id: RoomId, date: NaiveDate) -> Result<u32, LedgerError> {
        let Some(slot) = self.slot(room_id, date)? else {
            return Err(LedgerError::MissingEntry { room_id, date });
        };
        let mut slot = slot
            .lock()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;
        slot.available = (slot.available + 1).min(slot.capacity);
        Ok(slot.available)
    }

    /// Read a single calendar entry.
    pub fn entry(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Option<RoomAvailability>, LedgerError> {
        let Some(slot) = self.slot(room_id, date)? else {
            return Ok(None);
        };
        let slot = slot
            .lock()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;
        Ok(Some(RoomAvailability {
            room_id,
            date,
            available: slot.available,
            capacity: slot.capacity,
        }))
    }

    /// Read all calendar entries for a room, ordered by date.
    pub fn calendar(&self, room_id: RoomId) -> Result<Vec<RoomAvailability>, LedgerError> {
        let slots = self
            .slots
            .read()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;

        let mut entries = Vec::new();
        for (key, slot) in slots.iter() {
            if key.room_id != room_id {
                continue;
            }
            let slot = slot
                .lock()
                .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;
            entries.push(RoomAvailability {
                room_id,
                date: key.date,
                available: slot.available,
                capacity: slot.capacity,
            });
        }
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    fn slot(&self, room_id: RoomId, date: NaiveDate) -> Result<Option<Arc<Mutex<Slot>>>, LedgerError> {
        let slots = self
            .slots
            .read()
            .map_err(|_| LedgerError::Backend("lock poisoned".to_string()))?;
        Ok(slots.get(&SlotKey { room_id, date }).cloned())
    }
}

#[async_trait]
impl AvailabilityLedger for InMemoryAvailabilityLedger {
    async fn open(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        capacity: u32,
    ) -> Result<(), LedgerError> {
        Self::open(self, room_id, date, capacity)
    }

    async fn try_decrement(&self, room_id: RoomId, date: NaiveDate) -> Result<bool, LedgerError> {
        Self::try_decrement(self, room_id, date)
    }

    async fn increment(&self, room_id: RoomId, date: NaiveDate) -> Result<u32, LedgerError> {
        Self::increment(self, room_id, date)
    }

    async fn entry(
        &self,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<Option<RoomAvailability>, LedgerError> {
        Self::entry(self, room_id, date)
    }

    async fn calendar(&self, room_id: RoomId) -> Result<Vec<RoomAvailability>, LedgerError> {
        Self::calendar(self, room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    fn test_room_id() -> RoomId {
        RoomId::new(7)
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[test]
    fn open_creates_entry_with_full_availability() {
        let ledger = InMemoryAvailabilityLedger::new();
        ledger.open(test_room_id(), test_date(), 3).unwrap();

        let entry = ledger.entry(test_room_id(), test_date()).unwrap().unwrap();
        assert_eq!(entry.available, 3);
        assert_eq!(entry.capacity, 3);
        assert!(!entry.is_sold_out());
    }

    #[test]
    fn decrement_counts_down_to_zero_then_refuses() {
        let ledger = InMemoryAvailabilityLedger::new();
        ledger.open(test_room_id(), test_date(), 2).unwrap();

        assert!(ledger.try_decrement(test_room_id(), test_date()).unwrap());
        assert!(ledger.try_decrement(test_room_id(), test_date()).unwrap());
        assert!(!ledger.try_decrement(test_room_id(), test_date()).unwrap());

        let entry = ledger.entry(test_room_id(), test_date()).unwrap().unwrap();
        assert_eq!(entry.available, 0);
        assert!(entry.is_sold_out());
    }

    #[test]
    fn decrement_on_unopened_date_is_refused() {
        let ledger = InMemoryAvailabilityLedger::new();
        assert!(!ledger.try_decrement(test_room_id(), test_date()).unwrap());
        assert!(ledger.entry(test_room_id(), test_date()).unwrap().is_none());
    }

    #[test]
    fn increment_restores_a_unit() {
        let ledger = InMemoryAvailabilityLedger::new();
        ledger.open(test_room_id(), test_date(), 3).unwrap();
        assert!(ledger.try_decrement(test_room_id(), test_date()).unwrap());

        let after = ledger.increment(test_room_id(), test_date()).unwrap();
        assert_eq!(after, 3);
    }

    #[test]
    fn increment_clamps_at_capacity() {
        let ledger = InMemoryAvailabilityLedger::new();
        ledger.open(test_room_id(), test_date(), 2).unwrap();

        let after = ledger.increment(test_room_id(), test_date()).unwrap();
        assert_eq!(after, 2);
    }

    #[test]
    fn increment_on_unopened_date_is_an_error() {
        let ledger = InMemoryAvailabilityLedger::new();
        let err = ledger.increment(test_room_id(), test_date()).unwrap_err();
        match err {
            LedgerError::MissingEntry { room_id, .. } => assert_eq!(room_id, test_room_id()),
            other => panic!("Expected MissingEntry, got {other:?}"),
        }
    }

    #[test]
    fn reopening_resets_the_count() {
        let ledger = InMemoryAvailabilityLedger::new();
        ledger.open(test_room_id(), test_date(), 2).unwrap();
        assert!(ledger.try_decrement(test_room_id(), test_date()).unwrap());

        ledger.open(test_room_id(), test_date(), 5).unwrap();
        let entry = ledger.entry(test_room_id(), test_date()).unwrap().unwrap();
        assert_eq!(entry.available, 5);
        assert_eq!(entry.capacity, 5);
    }

    #[test]
    fn different_dates_do_not_share_inventory() {
        let ledger = InMemoryAvailabilityLedger::new();
        let d1 = test_date();
        let d2 = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
        ledger.open(test_room_id(), d1, 1).unwrap();
        ledger.open(test_room_id(), d2, 1).unwrap();

        assert!(ledger.try_decrement(test_room_id(), d1).unwrap());
        assert!(!ledger.try_decrement(test_room_id(), d1).unwrap());

        let entry = ledger.entry(test_room_id(), d2).unwrap().unwrap();
        assert_eq!(entry.available, 1);
    }

    #[test]
    fn calendar_lists_dates_in_order() {
        let ledger = InMemoryAvailabilityLedger::new();
        let other_room = RoomId::new(99);
        let d1 = NaiveDate::from_ymd_opt(2025, 7, 3).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
        ledger.open(test_room_id(), d1, 1).unwrap();
        ledger.open(test_room_id(), d2, 2).unwrap();
        ledger.open(test_room_id(), d3, 3).unwrap();
        ledger.open(other_room, d1, 9).unwrap();

        let calendar = ledger.calendar(test_room_id()).unwrap();
        let dates: Vec<NaiveDate> = calendar.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![d2, d3, d1]);
        assert!(calendar.iter().all(|e| e.room_id == test_room_id()));
    }

    #[test]
    fn oversubscribed_date_grants_exactly_capacity() {
        let ledger = Arc::new(InMemoryAvailabilityLedger::new());
        (*ledger).open(test_room_id(), test_date(), 4).unwrap();

        let barrier = Arc::new(Barrier::new(16));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                (*ledger).try_decrement(test_room_id(), test_date()).unwrap()
            }));
        }

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(successes, 4);

        let entry = (*ledger).entry(test_room_id(), test_date()).unwrap().unwrap();
        assert_eq!(entry.available, 0);
    }

    #[test]
    fn concurrent_decrements_across_keys_all_land() {
        let ledger = Arc::new(InMemoryAvailabilityLedger::new());
        let rooms: Vec<RoomId> = (1..=8).map(RoomId::new).collect();
        for room in &rooms {
            (*ledger).open(*room, test_date(), 10).unwrap();
        }

        let barrier = Arc::new(Barrier::new(8));
        let mut handles = Vec::new();
        for room in rooms.clone() {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                for _ in 0..10 {
                    assert!((*ledger).try_decrement(room, test_date()).unwrap());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        for room in rooms {
            let entry = (*ledger).entry(room, test_date()).unwrap().unwrap();
            assert_eq!(entry.available, 0);
        }
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: successes == min(capacity, attempts), and the count
            /// lands exactly at capacity - successes (never negative).
            #[test]
            fn grants_are_bounded_by_capacity(capacity in 0u32..64, attempts in 0u32..128) {
                let ledger = InMemoryAvailabilityLedger::new();
                ledger.open(test_room_id(), test_date(), capacity).unwrap();

                let successes = (0..attempts)
                    .filter(|_| ledger.try_decrement(test_room_id(), test_date()).unwrap())
                    .count() as u32;

                prop_assert_eq!(successes, capacity.min(attempts));
                let entry = ledger.entry(test_room_id(), test_date()).unwrap().unwrap();
                prop_assert_eq!(entry.available, capacity - successes);
            }

            /// Property: any interleaving of decrements and compensating
            /// increments keeps the count within [0, capacity].
            #[test]
            fn interleaved_ops_stay_within_bounds(
                capacity in 1u32..32,
                ops in proptest::collection::vec(proptest::bool::ANY, 0..200)
            ) {
                let ledger = InMemoryAvailabilityLedger::new();
                ledger.open(test_room_id(), test_date(), capacity).unwrap();

                for take in ops {
                    if take {
                        ledger.try_decrement(test_room_id(), test_date()).unwrap();
                    } else {
                        let after = ledger.increment(test_room_id(), test_date()).unwrap();
                        prop_assert!(after <= capacity);
                    }
                    let entry = ledger.entry(test_room_id(), test_date()).unwrap().unwrap();
                    prop_assert!(entry.available <= capacity);
                }
            }
        }
    }
}

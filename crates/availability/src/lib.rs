//! `stayforge-availability` — per-room, per-date inventory.
//!
//! The availability ledger is the single owner of sellable room counts.
//! Every reservation goes through `try_decrement`, every compensation
//! through `increment`; nothing else mutates a count.

pub mod in_memory;
pub mod ledger;

pub use in_memory::InMemoryAvailabilityLedger;
pub use ledger::{AvailabilityLedger, LedgerError, RoomAvailability};

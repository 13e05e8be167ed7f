//! `stayforge-catalog` — property and room listings.
//!
//! Plain records with explicit foreign keys, a store contract, and an
//! in-memory store for dev/test. Room inventory counts live elsewhere
//! (the availability ledger); this crate only describes what exists.

pub mod property;
pub mod store;

pub use property::{NewProperty, NewRoom, Property, PropertyWithRooms, Room};
pub use store::{CatalogStore, CatalogStoreError, InMemoryCatalogStore, PropertySearch};

//! Infrastructure backends: Postgres stores and the Redis Streams broker.
//!
//! The domain crates define the contracts (availability ledger, booking and
//! catalog stores, message bus) and ship in-memory implementations for dev
//! and test. This crate implements the same contracts against real
//! services, so wiring swaps one constructor for another.

pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis_streams;

pub use postgres::{
    ensure_schema, PostgresAvailabilityLedger, PostgresBookingStore, PostgresCatalogStore,
};

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsBroker;

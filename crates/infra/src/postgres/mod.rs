//! Postgres-backed stores.
//!
//! All three stores share one [`sqlx::PgPool`]; each open booking platform
//! table is created on startup by [`ensure_schema`] if it does not already
//! exist.
//!
//! ## Error Mapping
//!
//! SQLx errors are collapsed into each contract's `Backend` variant with
//! the failing operation named in the message:
//!
//! | SQLx error | Mapped to | Scenario |
//! |------------|-----------|----------|
//! | `Database` | `Backend` | Constraint violations, bad SQL |
//! | `PoolClosed` / `PoolTimedOut` | `Backend` | Pool exhausted or shut down |
//! | Other | `Backend` | Network failures, protocol errors |
//!
//! Domain conditions are never encoded as errors here: a failed decrement
//! is `Ok(false)`, a missing booking is `NotFound`, a settled booking is
//! `AlreadyTerminal`.

mod availability;
mod bookings;
mod catalog;

pub use availability::PostgresAvailabilityLedger;
pub use bookings::PostgresBookingStore;
pub use catalog::PostgresCatalogStore;

use sqlx::PgPool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS properties (
        id             BIGSERIAL PRIMARY KEY,
        name           TEXT NOT NULL,
        city           TEXT NOT NULL,
        area           TEXT NOT NULL,
        state          TEXT NOT NULL,
        beds           INTEGER NOT NULL,
        bathrooms      INTEGER NOT NULL,
        guests_allowed INTEGER NOT NULL,
        contact_email  TEXT NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rooms (
        id               BIGSERIAL PRIMARY KEY,
        property_id      BIGINT NOT NULL REFERENCES properties(id),
        room_type        TEXT NOT NULL,
        base_price_cents BIGINT NOT NULL CHECK (base_price_cents > 0)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS rooms_property_idx ON rooms(property_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS room_availability (
        room_id   BIGINT NOT NULL REFERENCES rooms(id),
        date      DATE NOT NULL,
        capacity  INTEGER NOT NULL CHECK (capacity >= 0),
        available INTEGER NOT NULL CHECK (available >= 0),
        PRIMARY KEY (room_id, date),
        CHECK (available <= capacity)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bookings (
        id                  BIGSERIAL PRIMARY KEY,
        room_id             BIGINT NOT NULL REFERENCES rooms(id),
        date                DATE NOT NULL,
        guest_email         TEXT NOT NULL,
        amount_cents        BIGINT NOT NULL,
        provider_session_id TEXT,
        status              TEXT NOT NULL DEFAULT 'pending',
        failure_reason      TEXT,
        created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at          TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

/// Create any missing tables. Idempotent; runs at startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

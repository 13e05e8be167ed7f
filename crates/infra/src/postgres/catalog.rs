//! Postgres-backed catalog store.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use stayforge_catalog::{
    CatalogStore, CatalogStoreError, NewProperty, Property, PropertySearch, PropertyWithRooms,
    Room,
};
use stayforge_core::{EmailAddress, PropertyId, RoomId};

#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn rooms_of(&self, property_id: PropertyId) -> Result<Vec<Room>, CatalogStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, property_id, room_type, base_price_cents
            FROM rooms
            WHERE property_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(property_id.as_i64())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| backend("rooms_of", e))?;

        rows.iter().map(room_from_row).collect()
    }
}

fn backend(operation: &str, e: impl core::fmt::Display) -> CatalogStoreError {
    CatalogStoreError::Backend(format!("{operation}: {e}"))
}

fn property_from_row(row: &PgRow) -> Result<Property, CatalogStoreError> {
    let contact_email: String = row.try_get("contact_email").map_err(|e| backend("row", e))?;

    Ok(Property {
        id: PropertyId::new(row.try_get("id").map_err(|e| backend("row", e))?),
        name: row.try_get("name").map_err(|e| backend("row", e))?,
        city: row.try_get("city").map_err(|e| backend("row", e))?,
        area: row.try_get("area").map_err(|e| backend("row", e))?,
        state: row.try_get("state").map_err(|e| backend("row", e))?,
        beds: row.try_get::<i32, _>("beds").map_err(|e| backend("row", e))? as u32,
        bathrooms: row
            .try_get::<i32, _>("bathrooms")
            .map_err(|e| backend("row", e))? as u32,
        guests_allowed: row
            .try_get::<i32, _>("guests_allowed")
            .map_err(|e| backend("row", e))? as u32,
        contact_email: EmailAddress::new(contact_email).map_err(|e| backend("row", e))?,
        created_at: row.try_get("created_at").map_err(|e| backend("row", e))?,
    })
}

fn room_from_row(row: &PgRow) -> Result<Room, CatalogStoreError> {
    Ok(Room {
        id: RoomId::new(row.try_get("id").map_err(|e| backend("row", e))?),
        property_id: PropertyId::new(row.try_get("property_id").map_err(|e| backend("row", e))?),
        room_type: row.try_get("room_type").map_err(|e| backend("row", e))?,
        base_price_cents: row
            .try_get::<i64, _>("base_price_cents")
            .map_err(|e| backend("row", e))? as u64,
    })
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self, new), fields(name = %new.name, rooms = new.rooms.len()), err)]
    async fn register(&self, new: NewProperty) -> Result<PropertyWithRooms, CatalogStoreError> {
        new.validate()?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| backend("register", e))?;

        let property_row = sqlx::query(
            r#"
            INSERT INTO properties
                (name, city, area, state, beds, bathrooms, guests_allowed, contact_email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, name, city, area, state, beds, bathrooms,
                      guests_allowed, contact_email, created_at
            "#,
        )
        .bind(&new.name)
        .bind(&new.city)
        .bind(&new.area)
        .bind(&new.state)
        .bind(new.beds as i32)
        .bind(new.bathrooms as i32)
        .bind(new.guests_allowed as i32)
        .bind(new.contact_email.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| backend("register", e))?;
        let property = property_from_row(&property_row)?;

        let mut rooms = Vec::with_capacity(new.rooms.len());
        for room in &new.rooms {
            let row = sqlx::query(
                r#"
                INSERT INTO rooms (property_id, room_type, base_price_cents)
                VALUES ($1, $2, $3)
                RETURNING id, property_id, room_type, base_price_cents
                "#,
            )
            .bind(property.id.as_i64())
            .bind(&room.room_type)
            .bind(room.base_price_cents as i64)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| backend("register", e))?;
            rooms.push(room_from_row(&row)?);
        }

        tx.commit().await.map_err(|e| backend("register", e))?;

        Ok(PropertyWithRooms { property, rooms })
    }

    async fn property(
        &self,
        id: PropertyId,
    ) -> Result<Option<PropertyWithRooms>, CatalogStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, city, area, state, beds, bathrooms,
                   guests_allowed, contact_email, created_at
            FROM properties
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| backend("property", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let property = property_from_row(&row)?;
        let rooms = self.rooms_of(property.id).await?;

        Ok(Some(PropertyWithRooms { property, rooms }))
    }

    async fn room(&self, id: RoomId) -> Result<Option<Room>, CatalogStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, property_id, room_type, base_price_cents
            FROM rooms
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| backend("room", e))?;

        row.as_ref().map(room_from_row).transpose()
    }

    #[instrument(skip(self, filter), err)]
    async fn search(&self, filter: &PropertySearch) -> Result<Vec<Property>, CatalogStoreError> {
        let pattern = filter.name.as_ref().map(|name| format!("%{name}%"));

        let rows = sqlx::query(
            r#"
            SELECT id, name, city, area, state, beds, bathrooms,
                   guests_allowed, contact_email, created_at
            FROM properties p
            WHERE ($1::text IS NULL OR p.name ILIKE $1 OR p.city ILIKE $1)
              AND ($2::date IS NULL OR EXISTS (
                    SELECT 1
                    FROM rooms r
                    JOIN room_availability a ON a.room_id = r.id
                    WHERE r.property_id = p.id
                      AND a.date = $2
                      AND a.available > 0))
            ORDER BY p.id ASC
            "#,
        )
        .bind(pattern)
        .bind(filter.date)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| backend("search", e))?;

        rows.iter().map(property_from_row).collect()
    }
}

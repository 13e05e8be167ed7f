//! Catalog store contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use thiserror::Error;

use stayforge_availability::{AvailabilityLedger, LedgerError};
use stayforge_core::{DomainError, PropertyId, RoomId};

use crate::property::{NewProperty, Property, PropertyWithRooms, Room};

/// Catalog store operation error.
#[derive(Debug, Error)]
pub enum CatalogStoreError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// The date filter could not be evaluated against the ledger.
    #[error("availability lookup failed: {0}")]
    Availability(#[from] LedgerError),

    #[error("storage failure: {0}")]
    Backend(String),
}

/// Search filter for property listings.
///
/// `name` matches case-insensitively against property name or city; `date`
/// keeps only properties with at least one room still available that day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySearch {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
}

/// Store of property and room records.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Register a property with its rooms, assigning ids.
    async fn register(&self, new: NewProperty) -> Result<PropertyWithRooms, CatalogStoreError>;

    /// Fetch a property with its rooms.
    async fn property(&self, id: PropertyId)
    -> Result<Option<PropertyWithRooms>, CatalogStoreError>;

    /// Fetch a single room.
    async fn room(&self, id: RoomId) -> Result<Option<Room>, CatalogStoreError>;

    /// Search property listings.
    async fn search(&self, filter: &PropertySearch) -> Result<Vec<Property>, CatalogStoreError>;
}

#[async_trait]
impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    async fn register(&self, new: NewProperty) -> Result<PropertyWithRooms, CatalogStoreError> {
        (**self).register(new).await
    }

    async fn property(
        &self,
        id: PropertyId,
    ) -> Result<Option<PropertyWithRooms>, CatalogStoreError> {
        (**self).property(id).await
    }

    async fn room(&self, id: RoomId) -> Result<Option<Room>, CatalogStoreError> {
        (**self).room(id).await
    }

    async fn search(&self, filter: &PropertySearch) -> Result<Vec<Property>, CatalogStoreError> {
        (**self).search(filter).await
    }
}

/// In-memory catalog store.
///
/// Holds a ledger handle so date-filtered search can consult availability;
/// the Postgres store answers the same question with a join.
pub struct InMemoryCatalogStore {
    ledger: Arc<dyn AvailabilityLedger>,
    next_property_id: AtomicI64,
    next_room_id: AtomicI64,
    properties: RwLock<HashMap<PropertyId, Property>>,
    rooms: RwLock<HashMap<RoomId, Room>>,
}

impl InMemoryCatalogStore {
    pub fn new(ledger: Arc<dyn AvailabilityLedger>) -> Self {
        Self {
            ledger,
            next_property_id: AtomicI64::new(1),
            next_room_id: AtomicI64::new(1),
            properties: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
        }
    }

    fn name_matches(property: &Property, filter: &PropertySearch) -> bool {
        match &filter.name {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                property.name.to_lowercase().contains(&needle)
                    || property.city.to_lowercase().contains(&needle)
            }
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn register(&self, new: NewProperty) -> Result<PropertyWithRooms, CatalogStoreError> {
        new.validate()?;

        let property_id = PropertyId::new(self.next_property_id.fetch_add(1, Ordering::SeqCst));
        let property = Property {
            id: property_id,
            name: new.name,
            city: new.city,
            area: new.area,
            state: new.state,
            beds: new.beds,
            bathrooms: new.bathrooms,
            guests_allowed: new.guests_allowed,
            contact_email: new.contact_email,
            created_at: Utc::now(),
        };

        let rooms: Vec<Room> = new
            .rooms
            .into_iter()
            .map(|r| Room {
                id: RoomId::new(self.next_room_id.fetch_add(1, Ordering::SeqCst)),
                property_id,
                room_type: r.room_type,
                base_price_cents: r.base_price_cents,
            })
            .collect();

        {
            let mut properties = self
                .properties
                .write()
                .map_err(|_| CatalogStoreError::Backend("lock poisoned".to_string()))?;
            properties.insert(property_id, property.clone());
        }
        {
            let mut room_map = self
                .rooms
                .write()
                .map_err(|_| CatalogStoreError::Backend("lock poisoned".to_string()))?;
            for room in &rooms {
                room_map.insert(room.id, room.clone());
            }
        }

        Ok(PropertyWithRooms { property, rooms })
    }

    async fn property(
        &self,
        id: PropertyId,
    ) -> Result<Option<PropertyWithRooms>, CatalogStoreError> {
        let property = {
            let properties = self
                .properties
                .read()
                .map_err(|_| CatalogStoreError::Backend("lock poisoned".to_string()))?;
            properties.get(&id).cloned()
        };
        let Some(property) = property else {
            return Ok(None);
        };

        let mut rooms: Vec<Room> = {
            let room_map = self
                .rooms
                .read()
                .map_err(|_| CatalogStoreError::Backend("lock poisoned".to_string()))?;
            room_map
                .values()
                .filter(|r| r.property_id == id)
                .cloned()
                .collect()
        };
        rooms.sort_by_key(|r| r.id.as_i64());

        Ok(Some(PropertyWithRooms { property, rooms }))
    }

    async fn room(&self, id: RoomId) -> Result<Option<Room>, CatalogStoreError> {
        let rooms = self
            .rooms
            .read()
            .map_err(|_| CatalogStoreError::Backend("lock poisoned".to_string()))?;
        Ok(rooms.get(&id).cloned())
    }

    async fn search(&self, filter: &PropertySearch) -> Result<Vec<Property>, CatalogStoreError> {
        let mut candidates: Vec<Property> = {
            let properties = self
                .properties
                .read()
                .map_err(|_| CatalogStoreError::Backend("lock poisoned".to_string()))?;
            properties
                .values()
                .filter(|p| Self::name_matches(p, filter))
                .cloned()
                .collect()
        };
        candidates.sort_by_key(|p| p.id.as_i64());

        let Some(date) = filter.date else {
            return Ok(candidates);
        };

        // Snapshot room ids per candidate before touching the ledger, so no
        // lock guard is held across an await.
        let with_rooms: Vec<(Property, Vec<RoomId>)> = {
            let room_map = self
                .rooms
                .read()
                .map_err(|_| CatalogStoreError::Backend("lock poisoned".to_string()))?;
            candidates
                .into_iter()
                .map(|p| {
                    let room_ids = room_map
                        .values()
                        .filter(|r| r.property_id == p.id)
                        .map(|r| r.id)
                        .collect();
                    (p, room_ids)
                })
                .collect()
        };

        let mut matches = Vec::new();
        for (property, room_ids) in with_rooms {
            let mut has_open_room = false;
            for room_id in room_ids {
                if let Some(entry) = self.ledger.entry(room_id, date).await? {
                    if entry.available > 0 {
                        has_open_room = true;
                        break;
                    }
                }
            }
            if has_open_room {
                matches.push(property);
            }
        }
        Ok(matches)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stayforge_core::{DomainError, DomainResult, EmailAddress, PropertyId, RoomId};

/// A property listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub city: String,
    pub area: String,
    pub state: String,
    pub beds: u32,
    pub bathrooms: u32,
    pub guests_allowed: u32,
    /// Where "your property is live" style notifications go.
    pub contact_email: EmailAddress,
    pub created_at: DateTime<Utc>,
}

/// A bookable room within a property.
///
/// References its property by id. Room-to-property navigation is a store
/// lookup, never an embedded object graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub property_id: PropertyId,
    pub room_type: String,
    /// Nightly price in the smallest currency unit.
    pub base_price_cents: u64,
}

/// A property together with its rooms (detail view).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyWithRooms {
    pub property: Property,
    pub rooms: Vec<Room>,
}

/// Registration input for a property. Ids are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProperty {
    pub name: String,
    pub city: String,
    pub area: String,
    pub state: String,
    pub beds: u32,
    pub bathrooms: u32,
    pub guests_allowed: u32,
    pub contact_email: EmailAddress,
    pub rooms: Vec<NewRoom>,
}

/// Registration input for a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoom {
    pub room_type: String,
    pub base_price_cents: u64,
}

impl NewProperty {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("property name cannot be empty"));
        }
        if self.city.trim().is_empty() {
            return Err(DomainError::validation("city cannot be empty"));
        }
        if self.state.trim().is_empty() {
            return Err(DomainError::validation("state cannot be empty"));
        }
        if self.guests_allowed == 0 {
            return Err(DomainError::validation("guests_allowed must be at least 1"));
        }
        if self.rooms.is_empty() {
            return Err(DomainError::validation("a property needs at least one room"));
        }
        for room in &self.rooms {
            room.validate()?;
        }
        Ok(())
    }
}

impl NewRoom {
    pub fn validate(&self) -> DomainResult<()> {
        if self.room_type.trim().is_empty() {
            return Err(DomainError::validation("room_type cannot be empty"));
        }
        if self.base_price_cents == 0 {
            return Err(DomainError::validation("base_price_cents must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_new_property() -> NewProperty {
        NewProperty {
            name: "Seaside Villa".to_string(),
            city: "Goa".to_string(),
            area: "Anjuna".to_string(),
            state: "Goa".to_string(),
            beds: 3,
            bathrooms: 2,
            guests_allowed: 6,
            contact_email: EmailAddress::new("owner@example.com").unwrap(),
            rooms: vec![NewRoom {
                room_type: "Deluxe".to_string(),
                base_price_cents: 12_000_00,
            }],
        }
    }

    #[test]
    fn valid_registration_passes() {
        assert!(test_new_property().validate().is_ok());
    }

    #[test]
    fn registration_rejects_blank_name() {
        let mut new = test_new_property();
        new.name = "   ".to_string();
        let err = new.validate().unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for blank name"),
        }
    }

    #[test]
    fn registration_rejects_zero_guests() {
        let mut new = test_new_property();
        new.guests_allowed = 0;
        assert!(new.validate().is_err());
    }

    #[test]
    fn registration_rejects_empty_room_list() {
        let mut new = test_new_property();
        new.rooms.clear();
        let err = new.validate().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("at least one room")),
            _ => panic!("Expected Validation error for empty room list"),
        }
    }

    #[test]
    fn registration_rejects_free_room() {
        let mut new = test_new_property();
        new.rooms[0].base_price_cents = 0;
        assert!(new.validate().is_err());
    }
}

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use stayforge_booking::CheckoutStarted;
use stayforge_catalog::{NewProperty, NewRoom};
use stayforge_core::{DomainError, EmailAddress};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct StartCheckoutRequest {
    pub room_id: i64,
    pub date: NaiveDate,
    pub guest_email: String,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: String,
    pub booking_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRoomRequest {
    pub room_type: String,
    pub base_price_cents: u64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPropertyRequest {
    pub name: String,
    pub city: String,
    pub area: String,
    pub state: String,
    pub beds: u32,
    pub bathrooms: u32,
    pub guests_allowed: u32,
    pub contact_email: String,
    pub rooms: Vec<RegisterRoomRequest>,
}

impl RegisterPropertyRequest {
    pub fn into_new_property(self) -> Result<NewProperty, DomainError> {
        let contact_email = EmailAddress::new(self.contact_email)?;
        Ok(NewProperty {
            name: self.name,
            city: self.city,
            area: self.area,
            state: self.state,
            beds: self.beds,
            bathrooms: self.bathrooms,
            guests_allowed: self.guests_allowed,
            contact_email,
            rooms: self
                .rooms
                .into_iter()
                .map(|room| NewRoom {
                    room_type: room.room_type,
                    base_price_cents: room.base_price_cents,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct OpenDateRequest {
    pub date: NaiveDate,
    pub capacity: u32,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn checkout_started_to_json(started: &CheckoutStarted) -> serde_json::Value {
    json!({
        "booking_id": started.booking.id,
        "session_id": started.booking.provider_session_id,
        "checkout_url": started.checkout_url,
    })
}

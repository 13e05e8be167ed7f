//! Booking records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stayforge_core::{BookingId, EmailAddress, ProviderSessionId, RoomId};

/// Lifecycle of a booking.
///
/// `Pending` is the only non-terminal status. Once a booking is `Confirmed`
/// or `Failed` it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Failed,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

/// Why a booking ended up `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The provider reported the checkout session unpaid.
    NotPaid,
    /// Payment went through but the date sold out first.
    SoldOut,
}

/// One guest's reservation of one room for one night.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub guest_email: EmailAddress,
    /// Amount due in the smallest currency unit, fixed at checkout time.
    pub amount_cents: u64,
    /// Hosted checkout session this booking is waiting on. Bound right
    /// after the provider issues the session; a success callback carrying
    /// any other session is rejected.
    pub provider_session_id: Option<ProviderSessionId>,
    pub status: BookingStatus,
    pub failure_reason: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Input for creating a pending booking. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub guest_email: EmailAddress,
    pub amount_cents: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&BookingStatus::Pending).unwrap(),
            r#""pending""#
        );
        assert_eq!(
            serde_json::to_string(&BookingStatus::Confirmed).unwrap(),
            r#""confirmed""#
        );
        assert_eq!(
            serde_json::to_string(&BookingStatus::Failed).unwrap(),
            r#""failed""#
        );
    }

    #[test]
    fn failure_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FailureReason::NotPaid).unwrap(),
            r#""not_paid""#
        );
        assert_eq!(
            serde_json::to_string(&FailureReason::SoldOut).unwrap(),
            r#""sold_out""#
        );
    }
}

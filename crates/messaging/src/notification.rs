//! Wire format for notification requests.

use serde::{Deserialize, Serialize};

use stayforge_core::EmailAddress;

/// A request to send one email.
///
/// The wire schema is JSON with exactly the fields below. Unknown fields are
/// ignored on decode so the schema can grow without breaking older
/// consumers; a payload missing a field, or carrying an invalid address, is
/// malformed and gets skipped by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub to: EmailAddress,
    pub subject: String,
    pub body: String,
}

impl NotificationRequest {
    pub fn new(to: EmailAddress, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to,
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_wire_schema() {
        let raw = r#"{"to":"guest@example.com","subject":"Booking confirmed","body":"See you soon"}"#;

        let request = NotificationRequest::from_json(raw).unwrap();
        assert_eq!(request.to.as_str(), "guest@example.com");
        assert_eq!(request.subject, "Booking confirmed");
        assert_eq!(request.body, "See you soon");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let raw = r#"{"to":"guest@example.com","subject":"s","body":"b","priority":"high"}"#;

        assert!(NotificationRequest::from_json(raw).is_ok());
    }

    #[test]
    fn missing_fields_are_malformed() {
        let raw = r#"{"to":"guest@example.com","subject":"s"}"#;

        assert!(NotificationRequest::from_json(raw).is_err());
    }

    #[test]
    fn invalid_address_is_malformed() {
        let raw = r#"{"to":"not-an-address","subject":"s","body":"b"}"#;

        assert!(NotificationRequest::from_json(raw).is_err());
    }

    #[test]
    fn encodes_with_the_expected_field_names() {
        let request = NotificationRequest::new(
            "guest@example.com".parse().unwrap(),
            "Booking confirmed",
            "See you soon",
        );

        let raw = request.to_json().unwrap();
        assert!(raw.contains(r#""to":"guest@example.com""#));
        assert!(raw.contains(r#""subject":"Booking confirmed""#));
        assert!(raw.contains(r#""body":"See you soon""#));
    }
}

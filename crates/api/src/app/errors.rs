use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stayforge_availability::LedgerError;
use stayforge_booking::{BookingStoreError, CheckoutError};
use stayforge_catalog::CatalogStoreError;
use stayforge_core::DomainError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", message)
        }
        DomainError::InvariantViolation(_) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", message)
        }
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", message),
        DomainError::Conflict(_) => json_error(StatusCode::CONFLICT, "conflict", message),
    }
}

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        LedgerError::MissingEntry { .. } => json_error(StatusCode::NOT_FOUND, "not_found", message),
        LedgerError::Backend(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

pub fn catalog_error_to_response(err: CatalogStoreError) -> axum::response::Response {
    match err {
        CatalogStoreError::Domain(e) => domain_error_to_response(e),
        CatalogStoreError::Availability(e) => ledger_error_to_response(e),
        CatalogStoreError::Backend(message) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

pub fn booking_store_error_to_response(err: BookingStoreError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        BookingStoreError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        BookingStoreError::Backend(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

pub fn checkout_error_to_response(err: CheckoutError) -> axum::response::Response {
    match err {
        CheckoutError::UnknownRoom(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("room {id} not found"))
        }
        CheckoutError::Catalog(e) => catalog_error_to_response(e),
        CheckoutError::Provider(e) => {
            json_error(StatusCode::BAD_GATEWAY, "provider_error", e.to_string())
        }
        CheckoutError::Store(e) => booking_store_error_to_response(e),
    }
}

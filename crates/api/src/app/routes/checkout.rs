use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, warn};

use stayforge_booking::{BeginCheckout, ConfirmationError, ConfirmationOutcome};
use stayforge_core::{BookingId, EmailAddress, ProviderSessionId, RoomId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/session", post(start_session))
        .route("/success", get(success))
        .route("/cancel", get(cancel))
}

pub async fn start_session(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StartCheckoutRequest>,
) -> axum::response::Response {
    let guest_email = match EmailAddress::new(body.guest_email) {
        Ok(v) => v,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };

    let started = match services
        .orchestrator
        .begin_checkout(BeginCheckout {
            room_id: RoomId::new(body.room_id),
            date: body.date,
            guest_email,
        })
        .await
    {
        Ok(s) => s,
        Err(e) => return errors::checkout_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(dto::checkout_started_to_json(&started)),
    )
        .into_response()
}

/// Success callback the provider redirects the guest to.
///
/// The plain-text bodies are the surface the payment page shows, so the
/// three settled outcomes stay distinct: paid, not paid, and paid but the
/// date sold out first. Sold out gets its own conflict response so it can
/// never be mistaken for an unpaid session.
pub async fn success(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SuccessQuery>,
) -> axum::response::Response {
    let session_id = match ProviderSessionId::new(query.session_id) {
        Ok(v) => v,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
    };
    let booking_id = BookingId::new(query.booking_id);

    match services.orchestrator.confirm(booking_id, &session_id).await {
        Ok(ConfirmationOutcome::Confirmed(_)) => {
            (StatusCode::OK, "Payment successful").into_response()
        }
        Ok(ConfirmationOutcome::NotPaid(_)) => {
            (StatusCode::OK, "Payment not completed").into_response()
        }
        Ok(ConfirmationOutcome::SoldOut(_)) => {
            (StatusCode::CONFLICT, "Payment received but the date sold out").into_response()
        }
        Err(ConfirmationError::Provider(e)) => {
            warn!(booking_id = %booking_id, error = %e, "payment verification unavailable");
            (StatusCode::BAD_GATEWAY, "Stripe error occurred").into_response()
        }
        Err(ConfirmationError::UnknownBooking(id)) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("booking {id} not found"),
        ),
        Err(ConfirmationError::SessionMismatch(id)) => errors::json_error(
            StatusCode::CONFLICT,
            "session_mismatch",
            format!("session does not match booking {id}"),
        ),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}

/// Cancel callback: the guest backed out on the payment page. The booking
/// stays pending and holds no inventory.
pub async fn cancel() -> impl IntoResponse {
    debug!("guest cancelled checkout");
    (StatusCode::OK, "Payment cancelled")
}

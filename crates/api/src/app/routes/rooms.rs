use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;

use stayforge_availability::RoomAvailability;
use stayforge_catalog::Room;
use stayforge_core::RoomId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/:id", get(get_room))
        .route("/:id/availability", get(calendar).post(open_date))
        .route("/:id/availability/:date/decrement", post(decrement))
}

/// Resolve a room id or produce the response to send back instead.
async fn known_room(services: &AppServices, id: RoomId) -> Result<Room, axum::response::Response> {
    match services.catalog.room(id).await {
        Ok(Some(room)) => Ok(room),
        Ok(None) => Err(errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "room not found",
        )),
        Err(e) => Err(errors::catalog_error_to_response(e)),
    }
}

pub async fn get_room(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match known_room(&services, RoomId::new(id)).await {
        Ok(room) => Json(room).into_response(),
        Err(response) => response,
    }
}

pub async fn calendar(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    let room = match known_room(&services, RoomId::new(id)).await {
        Ok(room) => room,
        Err(response) => return response,
    };

    match services.ledger.calendar(room.id).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn open_date(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
    Json(body): Json<dto::OpenDateRequest>,
) -> axum::response::Response {
    let room = match known_room(&services, RoomId::new(id)).await {
        Ok(room) => room,
        Err(response) => return response,
    };

    if let Err(e) = services.ledger.open(room.id, body.date, body.capacity).await {
        return errors::ledger_error_to_response(e);
    }

    Json(RoomAvailability {
        room_id: room.id,
        date: body.date,
        available: body.capacity,
        capacity: body.capacity,
    })
    .into_response()
}

/// Take one unit off a date by hand (admin/back office). Runs through the
/// same guarded decrement as confirmation, so the count can never go
/// negative.
pub async fn decrement(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, date)): Path<(i64, NaiveDate)>,
) -> axum::response::Response {
    let room = match known_room(&services, RoomId::new(id)).await {
        Ok(room) => room,
        Err(response) => return response,
    };

    match services.ledger.try_decrement(room.id, date).await {
        Ok(true) => match services.ledger.entry(room.id, date).await {
            Ok(Some(entry)) => Json(entry).into_response(),
            Ok(None) => errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                "no availability entry for that date",
            ),
            Err(e) => errors::ledger_error_to_response(e),
        },
        Ok(false) => errors::json_error(
            StatusCode::CONFLICT,
            "sold_out",
            "no availability left for that date",
        ),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

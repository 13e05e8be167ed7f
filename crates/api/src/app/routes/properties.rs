use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::warn;

use stayforge_catalog::{PropertySearch, PropertyWithRooms};
use stayforge_core::PropertyId;
use stayforge_messaging::{NotificationRequest, NOTIFICATIONS_TOPIC};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register))
        .route("/search", get(search))
        .route("/:id", get(get_property))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterPropertyRequest>,
) -> axum::response::Response {
    let new = match body.into_new_property() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let listing = match services.catalog.register(new).await {
        Ok(l) => l,
        Err(e) => return errors::catalog_error_to_response(e),
    };

    announce_listing(&services, &listing);

    (StatusCode::CREATED, Json(listing)).into_response()
}

/// Tell the owner their listing is live. Best effort: a broker outage must
/// not fail the registration that already committed.
fn announce_listing(services: &AppServices, listing: &PropertyWithRooms) {
    let notification = NotificationRequest::new(
        listing.property.contact_email.clone(),
        "Your property is live",
        format!(
            "{} is now listed and ready to take bookings.",
            listing.property.name
        ),
    );
    let payload = match notification.to_json() {
        Ok(v) => v,
        Err(e) => {
            warn!(property_id = %listing.property.id, error = %e, "could not encode the listing notification");
            return;
        }
    };
    if let Err(e) = services.notifications.publish(NOTIFICATIONS_TOPIC, payload) {
        warn!(property_id = %listing.property.id, error = %e, "could not queue the listing notification");
    }
}

pub async fn search(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::SearchQuery>,
) -> axum::response::Response {
    let filter = PropertySearch {
        name: query.name,
        date: query.date,
    };

    match services.catalog.search(&filter).await {
        Ok(listings) => Json(listings).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

pub async fn get_property(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match services.catalog.property(PropertyId::new(id)).await {
        Ok(Some(listing)) => Json(listing).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "property not found"),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

use axum::Router;

pub mod checkout;
pub mod properties;
pub mod rooms;
pub mod system;

/// Router for all domain endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/checkout", checkout::router())
        .nest("/properties", properties::router())
        .nest("/rooms", rooms::router())
}

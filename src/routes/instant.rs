//! Instant-service route definitions

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn instant_routes() -> Router<AppState> {
    Router::new()
        .route("/api/instant-services", get(list_instant_services))
        .route("/api/instant-services/request", post(request_instant_service))
        .route(
            "/api/instant-services/presence",
            put(update_presence).delete(go_offline),
        )
        .route(
            "/api/instant-services/:booking_id/status",
            put(update_instant_status),
        )
}

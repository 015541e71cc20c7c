//! Route definitions for the marketplace API

mod booking;
mod instant;
mod negotiation;

use axum::{routing::get, Router};

use crate::handlers::health_check;
use crate::state::AppState;
use crate::websocket;

pub use booking::booking_routes;
pub use instant::instant_routes;
pub use negotiation::negotiation_routes;

/// Every route with state applied, before server-level layers
pub fn app_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::ws_handler))
        .merge(negotiation_routes())
        .merge(booking_routes())
        .merge(instant_routes())
        .with_state(app_state)
}

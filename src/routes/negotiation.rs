//! Negotiation route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn negotiation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/negotiations", get(list_negotiations))
        .route("/api/negotiations/start", post(start_negotiation))
        .route(
            "/api/negotiations/:id",
            get(get_negotiation).delete(delete_negotiation),
        )
        .route("/api/negotiations/:id/counter-offer", post(counter_offer))
        .route("/api/negotiations/:id/accept", post(accept_offer))
        .route("/api/negotiations/:id/decline", post(decline_offer))
        .route("/api/negotiations/:id/cancel", post(cancel_negotiation))
}

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    storage: &'static str,
    storage_status: String,
    websocket_clients: usize,
    available_providers: usize,
    version: &'static str,
}

pub async fn health_check(State(app_state): State<AppState>) -> Json<HealthResponse> {
    let storage_status = match app_state.store.health_check().await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if storage_status == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status,
        storage: app_state.store.name(),
        storage_status,
        websocket_clients: app_state.ws_state.connected_clients().await,
        available_providers: app_state.presence.list_available().await.len(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

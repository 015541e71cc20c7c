//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use servicemarket_server::auth::AuthService;
use servicemarket_server::geo::GeoPoint;
use servicemarket_server::models::Service;
use servicemarket_server::presence::PresenceUpdate;
use servicemarket_server::state::AppState;
use servicemarket_server::store::{MarketStore, MemoryStore};

pub const JWT_SECRET: &str = "integration-test-secret";

/// App state over a fresh in-memory store
pub fn memory_state() -> AppState {
    let store: Arc<dyn MarketStore> = Arc::new(MemoryStore::new());
    AppState::new(
        store,
        Arc::new(AuthService::new(JWT_SECRET, 900)),
        Duration::hours(48),
        Duration::seconds(300),
    )
}

pub fn service_at(flat_price: i64, location: GeoPoint) -> Service {
    let now = Utc::now();
    Service {
        id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        title: "Plumbing call-out".to_string(),
        category: "plumbing".to_string(),
        flat_price: Decimal::from(flat_price),
        latitude: location.lat,
        longitude: location.lon,
        service_radius_km: 15.0,
        base_duration_minutes: 20,
        instant_service_enabled: true,
        active: true,
        created_at: now,
        updated_at: now,
    }
}

pub async fn seed_service(state: &AppState, flat_price: i64) -> Service {
    let service = service_at(flat_price, GeoPoint::new(51.5074, -0.1278));
    state.store.insert_service(&service).await.unwrap();
    service
}

pub fn ping(location: GeoPoint) -> PresenceUpdate {
    PresenceUpdate {
        lat: location.lat,
        lon: location.lon,
        available: true,
        service_radius_km: None,
    }
}

//! PostgreSQL store tests
//!
//! Run with `TEST_DATABASE_URL` pointing at a scratch database and
//! `cargo test -- --ignored`.

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use servicemarket_server::booking::BookingDraft;
use servicemarket_server::booking::BookingService;
use servicemarket_server::error::ApiError;
use servicemarket_server::geo::{BoundingBox, GeoPoint};
use servicemarket_server::negotiation::{NegotiationService, NegotiationStatus, StartNegotiationRequest};
use servicemarket_server::store::{MarketStore, PgStore};

use common::service_at;

/// Helper to create a migrated test database pool
async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/servicemarket_test".to_string());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn engines(store: Arc<dyn MarketStore>) -> (NegotiationService, BookingService) {
    let negotiations = NegotiationService::new(store.clone(), chrono::Duration::hours(48));
    // Separate lock maps, as in two server processes
    let bookings = BookingService::new(store, Default::default());
    (negotiations, bookings)
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_negotiation_round_trip() {
    let store: Arc<dyn MarketStore> = Arc::new(PgStore::new(setup_test_db().await));
    let service = service_at(100, GeoPoint::new(40.4168, -3.7038));
    store.insert_service(&service).await.unwrap();
    let (negotiations, _) = engines(store.clone());
    let client = Uuid::new_v4();

    let started = negotiations
        .start_negotiation(
            client,
            StartNegotiationRequest {
                service_id: service.id,
                initial_offer: Decimal::new(8550, 2),
                message: None,
            },
        )
        .await
        .unwrap();

    let loaded = store.get_negotiation(started.id).await.unwrap().unwrap();
    assert_eq!(loaded.current_offer, Decimal::new(8550, 2));
    assert_eq!(loaded.offers.len(), 1);
    assert_eq!(loaded.status, NegotiationStatus::Active);

    // Stale version is rejected
    let err = store.update_negotiation(&loaded, loaded.version + 5).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_concurrent_bookings_of_one_negotiation() {
    let pool = setup_test_db().await;
    let store: Arc<dyn MarketStore> = Arc::new(PgStore::new(pool));
    let service = service_at(100, GeoPoint::new(40.4168, -3.7038));
    store.insert_service(&service).await.unwrap();
    let (negotiations, _) = engines(store.clone());
    let client = Uuid::new_v4();

    let negotiation = negotiations
        .start_negotiation(
            client,
            StartNegotiationRequest {
                service_id: service.id,
                initial_offer: Decimal::from(90),
                message: None,
            },
        )
        .await
        .unwrap();
    negotiations
        .accept_offer(negotiation.id, service.provider_id)
        .await
        .unwrap();

    // One engine per attempt: no shared in-process locks, only the database
    let attempts = (1..=6).map(|day| {
        let (_, bookings) = engines(store.clone());
        let draft = BookingDraft {
            client_id: client,
            service_id: service.id,
            date: Utc.with_ymd_and_hms(2032, 2, day, 12, 0, 0).unwrap(),
            negotiation_id: Some(negotiation.id),
            customer_location: None,
            instant: None,
        };
        tokio::spawn(async move { bookings.create_booking(draft).await })
    });

    let successes = join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();
    assert_eq!(successes, 1);

    let stored = store.get_negotiation(negotiation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, NegotiationStatus::Booked);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_bounding_box_query_across_antimeridian() {
    let store = PgStore::new(setup_test_db().await);
    let category = format!("test-{}", Uuid::new_v4());

    let mut east = service_at(50, GeoPoint::new(0.0, 179.95));
    east.category = category.clone();
    let mut west = service_at(50, GeoPoint::new(0.0, -179.95));
    west.category = category.clone();
    let mut far = service_at(50, GeoPoint::new(0.0, 170.0));
    far.category = category.clone();
    for service in [&east, &west, &far] {
        store.insert_service(service).await.unwrap();
    }

    let bbox = BoundingBox::around(GeoPoint::new(0.0, 180.0), 20.0);
    let found = store
        .list_instant_services(bbox, Some(&category))
        .await
        .unwrap();
    let ids: Vec<Uuid> = found.iter().map(|s| s.id).collect();

    assert!(ids.contains(&east.id));
    assert!(ids.contains(&west.id));
    assert!(!ids.contains(&far.id));
}

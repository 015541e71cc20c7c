//! Booking engine tests: pricing, uniqueness rules and races

mod common;

use chrono::{Duration, TimeZone, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use uuid::Uuid;

use servicemarket_server::booking::{BookingDraft, BookingStatus};
use servicemarket_server::error::ApiError;
use servicemarket_server::negotiation::{Negotiation, StartNegotiationRequest};
use servicemarket_server::state::AppState;

use common::{memory_state, seed_service};

fn draft(client: Uuid, service_id: Uuid, negotiation_id: Option<Uuid>, day: u32) -> BookingDraft {
    BookingDraft {
        client_id: client,
        service_id,
        date: Utc.with_ymd_and_hms(2031, 6, day, 10, 0, 0).unwrap(),
        negotiation_id,
        customer_location: None,
        instant: None,
    }
}

async fn completed_negotiation(state: &AppState, service_id: Uuid, client: Uuid, offer: i64) -> Negotiation {
    let negotiation = state
        .negotiation_service
        .start_negotiation(
            client,
            StartNegotiationRequest {
                service_id,
                initial_offer: Decimal::from(offer),
                message: None,
            },
        )
        .await
        .unwrap();
    let service = state.store.get_service(service_id).await.unwrap().unwrap();
    state
        .negotiation_service
        .accept_offer(negotiation.id, service.provider_id)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_second_booking_same_day_rejected() {
    let state = memory_state();
    let service_a = seed_service(&state, 100).await;
    let service_b = seed_service(&state, 40).await;
    let client = Uuid::new_v4();

    state
        .booking_service
        .create_booking(draft(client, service_a.id, None, 1))
        .await
        .unwrap();

    let mut late = draft(client, service_b.id, None, 1);
    late.date = late.date + Duration::hours(13);
    let err = state.booking_service.create_booking(late).await.unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    // Another client is unaffected
    state
        .booking_service
        .create_booking(draft(Uuid::new_v4(), service_b.id, None, 1))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_negotiated_price_is_kept_alongside_list_price() {
    let state = memory_state();
    let service = seed_service(&state, 100).await;
    let client = Uuid::new_v4();
    let negotiation = completed_negotiation(&state, service.id, client, 72).await;

    let booking = state
        .booking_service
        .create_booking(draft(client, service.id, Some(negotiation.id), 2))
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.original_price, Decimal::from(100));
    assert_eq!(booking.final_price, Decimal::from(72));
    assert_eq!(booking.total_amount, booking.final_price);
    assert_eq!(booking.negotiation_id, Some(negotiation.id));
}

#[tokio::test]
async fn test_negotiation_rules() {
    let state = memory_state();
    let service = seed_service(&state, 100).await;
    let other_service = seed_service(&state, 100).await;
    let client = Uuid::new_v4();
    let engine = &state.booking_service;

    let active = state
        .negotiation_service
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
    let err = engine
        .create_booking(draft(client, service.id, Some(active.id), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    let err = engine
        .create_booking(draft(Uuid::new_v4(), service.id, Some(active.id), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let err = engine
        .create_booking(draft(client, other_service.id, Some(active.id), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    let err = engine
        .create_booking(draft(client, service.id, Some(Uuid::new_v4()), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    state
        .negotiation_service
        .accept_offer(active.id, service.provider_id)
        .await
        .unwrap();
    engine
        .create_booking(draft(client, service.id, Some(active.id), 3))
        .await
        .unwrap();

    let err = engine
        .create_booking(draft(client, service.id, Some(active.id), 4))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn test_concurrent_bookings_of_one_negotiation() {
    let state = memory_state();
    let service = seed_service(&state, 100).await;
    let client = Uuid::new_v4();
    let negotiation = completed_negotiation(&state, service.id, client, 110).await;

    let attempts = (1..=8).map(|day| {
        let engine = state.booking_service.clone();
        let d = draft(client, service.id, Some(negotiation.id), day);
        tokio::spawn(async move { engine.create_booking(d).await })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.into_iter().filter_map(Result::err) {
        assert!(matches!(err, ApiError::BadRequest(_) | ApiError::Conflict(_)));
    }
    assert_eq!(state.booking_service.list_bookings(client).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_same_day_bookings() {
    let state = memory_state();
    let client = Uuid::new_v4();
    let mut services = Vec::new();
    for _ in 0..6 {
        services.push(seed_service(&state, 50).await);
    }

    let attempts = services.iter().map(|service| {
        let engine = state.booking_service.clone();
        let d = draft(client, service.id, None, 9);
        tokio::spawn(async move { engine.create_booking(d).await })
    });

    let successes = join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_cancel_by_either_party() {
    let state = memory_state();
    let service = seed_service(&state, 100).await;
    let client = Uuid::new_v4();

    let booking = state
        .booking_service
        .create_booking(draft(client, service.id, None, 10))
        .await
        .unwrap();

    let err = state
        .booking_service
        .cancel_booking(booking.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let cancelled = state
        .booking_service
        .cancel_booking(booking.id, service.provider_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let err = state
        .booking_service
        .cancel_booking(booking.id, client)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

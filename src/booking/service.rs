//! Booking service layer - booking creation and status changes

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use super::model::{day_bounds, Booking, BookingDraft, BookingStatus};
use crate::error::{ApiError, ApiResult};
use crate::locks::KeyedLocks;
use crate::negotiation::NegotiationStatus;
use crate::store::MarketStore;

/// Booking engine
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn MarketStore>,
    negotiation_locks: KeyedLocks<Uuid>,
    day_locks: KeyedLocks<(Uuid, NaiveDate)>,
    booking_locks: KeyedLocks<Uuid>,
}

impl BookingService {
    /// `negotiation_locks` must be the map the negotiation engine uses
    pub fn new(store: Arc<dyn MarketStore>, negotiation_locks: KeyedLocks<Uuid>) -> Self {
        Self {
            store,
            negotiation_locks,
            day_locks: KeyedLocks::new(),
            booking_locks: KeyedLocks::new(),
        }
    }

    /// Create a booking, optionally consuming a completed negotiation
    pub async fn create_booking(&self, draft: BookingDraft) -> ApiResult<Booking> {
        let service = self
            .store
            .get_service(draft.service_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Service"))?;

        if service.is_owned_by(draft.client_id) {
            return Err(ApiError::forbidden("Cannot book your own service"));
        }
        if !service.active {
            return Err(ApiError::bad_request("Service is not active"));
        }

        // Lock order: negotiation, then client day
        let _negotiation_guard = match draft.negotiation_id {
            Some(id) => Some(self.negotiation_locks.lock(id).await),
            None => None,
        };
        let day = draft.date.date_naive();
        let _day_guard = self.day_locks.lock((draft.client_id, day)).await;

        let final_price = match draft.negotiation_id {
            Some(negotiation_id) => {
                let negotiation = self
                    .store
                    .get_negotiation(negotiation_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("Negotiation"))?;

                if negotiation.client_id != draft.client_id {
                    return Err(ApiError::forbidden(
                        "Negotiation belongs to another client",
                    ));
                }
                if negotiation.service_id != service.id {
                    return Err(ApiError::bad_request(
                        "Negotiation is for a different service",
                    ));
                }
                if negotiation.status == NegotiationStatus::Booked
                    || self
                        .store
                        .find_booking_by_negotiation(negotiation_id)
                        .await?
                        .is_some()
                {
                    return Err(ApiError::bad_request("Negotiation has already been booked"));
                }
                if negotiation.status != NegotiationStatus::Completed {
                    return Err(ApiError::bad_request("Negotiation is not completed"));
                }

                negotiation.final_price.ok_or_else(|| {
                    ApiError::InternalError("Completed negotiation has no final price".into())
                })?
            }
            None => service.flat_price,
        };

        let (start, end) = day_bounds(day);
        if !self
            .store
            .bookings_for_client_between(draft.client_id, start, end)
            .await?
            .is_empty()
        {
            return Err(ApiError::bad_request(
                "You already have a booking on this date",
            ));
        }

        let now = Utc::now();
        let location = draft
            .instant
            .as_ref()
            .map(|i| i.customer_location)
            .or(draft.customer_location);

        let booking = Booking {
            id: Uuid::new_v4(),
            service_id: service.id,
            user_id: draft.client_id,
            provider_id: service.provider_id,
            date: draft.date,
            original_price: service.flat_price,
            final_price,
            total_amount: final_price,
            status: if draft.instant.is_some() {
                BookingStatus::Pending
            } else {
                BookingStatus::Confirmed
            },
            negotiation_id: draft.negotiation_id,
            is_instant: draft.instant.is_some(),
            customer_lat: location.map(|l| l.lat),
            customer_lon: location.map(|l| l.lon),
            urgency: draft.instant.as_ref().map(|i| i.urgency),
            distance_km: draft.instant.as_ref().map(|i| i.distance_km),
            estimated_arrival: draft.instant.as_ref().map(|i| i.estimated_arrival),
            actual_arrival: None,
            completion_time: None,
            created_at: now,
            updated_at: now,
        };

        self.store.create_booking(&booking).await?;

        tracing::info!(
            booking_id = %booking.id,
            service_id = %booking.service_id,
            client_id = %booking.user_id,
            negotiation_id = ?booking.negotiation_id,
            final_price = %booking.final_price,
            is_instant = booking.is_instant,
            "Booking created"
        );

        Ok(booking)
    }

    /// Provider-driven status change on a booking they serve
    pub async fn update_instant_status(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
        status: BookingStatus,
    ) -> ApiResult<Booking> {
        let _guard = self.booking_locks.lock(booking_id).await;
        let mut booking = self.load(booking_id).await?;

        if booking.provider_id != user_id {
            return Err(ApiError::forbidden(
                "Only the assigned provider can update this booking",
            ));
        }

        let previous = booking.status;
        booking.advance(status, Utc::now())?;
        self.store.update_booking(&booking).await?;

        tracing::info!(
            booking_id = %booking_id,
            from = ?previous,
            to = ?booking.status,
            "Booking status updated"
        );

        Ok(booking)
    }

    /// Cancel a pending or confirmed booking, freeing the client's day
    pub async fn cancel_booking(&self, booking_id: Uuid, user_id: Uuid) -> ApiResult<Booking> {
        let _guard = self.booking_locks.lock(booking_id).await;
        let mut booking = self.load(booking_id).await?;

        if !booking.is_party(user_id) {
            return Err(ApiError::forbidden("Not your booking"));
        }
        if !booking.status.is_cancellable() {
            return Err(ApiError::bad_request(format!(
                "Booking cannot be cancelled from status {:?}",
                booking.status
            )));
        }

        booking.advance(BookingStatus::Cancelled, Utc::now())?;
        self.store.update_booking(&booking).await?;

        tracing::info!(booking_id = %booking_id, user_id = %user_id, "Booking cancelled");

        Ok(booking)
    }

    pub async fn get_booking(&self, booking_id: Uuid, user_id: Uuid) -> ApiResult<Booking> {
        let booking = self.load(booking_id).await?;
        if !booking.is_party(user_id) {
            return Err(ApiError::forbidden("Not your booking"));
        }
        Ok(booking)
    }

    pub async fn list_bookings(&self, user_id: Uuid) -> ApiResult<Vec<Booking>> {
        self.store.list_bookings_for_user(user_id).await
    }

    async fn load(&self, booking_id: Uuid) -> ApiResult<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Service;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    async fn setup() -> (BookingService, Service) {
        let store: Arc<dyn MarketStore> = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let service = Service {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            title: "Lawn mowing".to_string(),
            category: "garden".to_string(),
            flat_price: Decimal::from(60),
            latitude: 0.0,
            longitude: 0.0,
            service_radius_km: 10.0,
            base_duration_minutes: 45,
            instant_service_enabled: false,
            active: true,
            created_at: now,
            updated_at: now,
        };
        store.insert_service(&service).await.unwrap();
        (BookingService::new(store, KeyedLocks::new()), service)
    }

    fn draft(service: &Service, client: Uuid, hour: u32) -> BookingDraft {
        BookingDraft {
            client_id: client,
            service_id: service.id,
            date: Utc.with_ymd_and_hms(2030, 3, 14, hour, 0, 0).unwrap(),
            negotiation_id: None,
            customer_location: None,
            instant: None,
        }
    }

    #[tokio::test]
    async fn test_direct_booking_uses_flat_price() {
        let (engine, service) = setup().await;
        let booking = engine
            .create_booking(draft(&service, Uuid::new_v4(), 9))
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.final_price, Decimal::from(60));
        assert_eq!(booking.original_price, booking.total_amount);
        assert!(!booking.is_instant);
    }

    #[tokio::test]
    async fn test_own_service_is_forbidden() {
        let (engine, service) = setup().await;
        let err = engine
            .create_booking(draft(&service, service.provider_id, 9))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_cancel_frees_the_day() {
        let (engine, service) = setup().await;
        let client = Uuid::new_v4();
        let first = engine.create_booking(draft(&service, client, 8)).await.unwrap();

        let err = engine.create_booking(draft(&service, client, 20)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        engine.cancel_booking(first.id, client).await.unwrap();
        engine.create_booking(draft(&service, client, 20)).await.unwrap();

        let mut next_day = draft(&service, client, 8);
        next_day.date = next_day.date + Duration::days(1);
        engine.create_booking(next_day).await.unwrap();
    }

    #[tokio::test]
    async fn test_only_provider_updates_status() {
        let (engine, service) = setup().await;
        let client = Uuid::new_v4();
        let booking = engine.create_booking(draft(&service, client, 9)).await.unwrap();

        let err = engine
            .update_instant_status(booking.id, client, BookingStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let updated = engine
            .update_instant_status(booking.id, service.provider_id, BookingStatus::InProgress)
            .await
            .unwrap();
        assert!(updated.actual_arrival.is_some());

        let err = engine.cancel_booking(booking.id, client).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_visibility() {
        let (engine, service) = setup().await;
        let client = Uuid::new_v4();
        let booking = engine.create_booking(draft(&service, client, 9)).await.unwrap();

        assert!(engine.get_booking(booking.id, service.provider_id).await.is_ok());
        let err = engine.get_booking(booking.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(engine.list_bookings(client).await.unwrap().len(), 1);
        assert_eq!(engine.list_bookings(service.provider_id).await.unwrap().len(), 1);
    }
}

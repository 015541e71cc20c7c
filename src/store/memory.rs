//! In-process store used by tests and `STORAGE_BACKEND=memory`
//!
//! A single write lock covers every mutation, which gives the same
//! all-or-nothing behaviour as the Postgres transactions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::MarketStore;
use crate::booking::{Booking, BookingStatus};
use crate::error::{ApiError, ApiResult};
use crate::geo::BoundingBox;
use crate::models::{check_price_scale, Service};
use crate::negotiation::{Negotiation, NegotiationStatus};

#[derive(Default)]
struct MemoryState {
    services: Vec<Service>,
    negotiations: HashMap<Uuid, Negotiation>,
    bookings: Vec<Booking>,
}

impl MemoryState {
    fn active_negotiation_exists(&self, service_id: Uuid, client_id: Uuid, except: Uuid) -> bool {
        self.negotiations.values().any(|n| {
            n.id != except
                && n.service_id == service_id
                && n.client_id == client_id
                && n.status == NegotiationStatus::Active
        })
    }

    fn day_taken(&self, booking: &Booking) -> bool {
        self.bookings.iter().any(|b| {
            b.id != booking.id
                && b.user_id == booking.user_id
                && b.status != BookingStatus::Cancelled
                && b.booking_day() == booking.booking_day()
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> ApiResult<()> {
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> ApiResult<Option<Service>> {
        let state = self.state.read().await;
        Ok(state.services.iter().find(|s| s.id == id).cloned())
    }

    async fn insert_service(&self, service: &Service) -> ApiResult<()> {
        check_price_scale(service.flat_price)?;
        let mut state = self.state.write().await;
        if state.services.iter().any(|s| s.id == service.id) {
            return Err(ApiError::conflict("Service already exists"));
        }
        state.services.push(service.clone());
        Ok(())
    }

    async fn list_instant_services(
        &self,
        bbox: BoundingBox,
        category: Option<&str>,
    ) -> ApiResult<Vec<Service>> {
        let state = self.state.read().await;
        Ok(state
            .services
            .iter()
            .filter(|s| s.active && s.instant_service_enabled)
            .filter(|s| category.map_or(true, |c| s.category == c))
            .filter(|s| bbox.contains(s.location()))
            .cloned()
            .collect())
    }

    async fn get_negotiation(&self, id: Uuid) -> ApiResult<Option<Negotiation>> {
        Ok(self.state.read().await.negotiations.get(&id).cloned())
    }

    async fn find_active_negotiation(
        &self,
        service_id: Uuid,
        client_id: Uuid,
    ) -> ApiResult<Option<Negotiation>> {
        let state = self.state.read().await;
        Ok(state
            .negotiations
            .values()
            .find(|n| {
                n.service_id == service_id
                    && n.client_id == client_id
                    && n.status == NegotiationStatus::Active
            })
            .cloned())
    }

    async fn insert_negotiation(&self, negotiation: &Negotiation) -> ApiResult<()> {
        let mut state = self.state.write().await;
        if negotiation.status == NegotiationStatus::Active
            && state.active_negotiation_exists(
                negotiation.service_id,
                negotiation.client_id,
                negotiation.id,
            )
        {
            return Err(ApiError::conflict(
                "An active negotiation already exists for this service",
            ));
        }
        state
            .negotiations
            .insert(negotiation.id, negotiation.clone());
        Ok(())
    }

    async fn update_negotiation(
        &self,
        negotiation: &Negotiation,
        expected_version: i64,
    ) -> ApiResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .negotiations
            .get_mut(&negotiation.id)
            .ok_or_else(|| ApiError::not_found("Negotiation"))?;

        if stored.version != expected_version {
            return Err(ApiError::conflict(
                "Negotiation was modified concurrently, retry",
            ));
        }
        *stored = negotiation.clone();
        Ok(())
    }

    async fn delete_negotiation(&self, id: Uuid) -> ApiResult<bool> {
        Ok(self.state.write().await.negotiations.remove(&id).is_some())
    }

    async fn list_negotiations_for_user(
        &self,
        user_id: Uuid,
        status: Option<NegotiationStatus>,
    ) -> ApiResult<Vec<Negotiation>> {
        let state = self.state.read().await;
        let mut found: Vec<Negotiation> = state
            .negotiations
            .values()
            .filter(|n| n.client_id == user_id || n.provider_id == user_id)
            .filter(|n| status.map_or(true, |s| n.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn get_booking(&self, id: Uuid) -> ApiResult<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state.bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn find_booking_by_negotiation(
        &self,
        negotiation_id: Uuid,
    ) -> ApiResult<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state
            .bookings
            .iter()
            .find(|b| b.negotiation_id == Some(negotiation_id))
            .cloned())
    }

    async fn bookings_for_client_between(
        &self,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(state
            .bookings
            .iter()
            .filter(|b| {
                b.user_id == client_id
                    && b.status != BookingStatus::Cancelled
                    && b.date >= start
                    && b.date <= end
            })
            .cloned()
            .collect())
    }

    async fn create_booking(&self, booking: &Booking) -> ApiResult<()> {
        let mut state = self.state.write().await;

        if state.day_taken(booking) {
            return Err(ApiError::conflict(
                "Client already has a booking on this date",
            ));
        }

        if let Some(negotiation_id) = booking.negotiation_id {
            if state
                .bookings
                .iter()
                .any(|b| b.negotiation_id == Some(negotiation_id))
            {
                return Err(ApiError::conflict("Negotiation has already been booked"));
            }

            let negotiation = state
                .negotiations
                .get_mut(&negotiation_id)
                .ok_or_else(|| ApiError::not_found("Negotiation"))?;
            negotiation
                .mark_booked(booking.created_at)
                .map_err(|_| ApiError::conflict("Negotiation is no longer available for booking"))?;
            negotiation.version += 1;
        }

        state.bookings.push(booking.clone());
        Ok(())
    }

    async fn update_booking(&self, booking: &Booking) -> ApiResult<()> {
        let mut state = self.state.write().await;

        if booking.status != BookingStatus::Cancelled && state.day_taken(booking) {
            return Err(ApiError::conflict(
                "Client already has a booking on this date",
            ));
        }

        let stored = state
            .bookings
            .iter_mut()
            .find(|b| b.id == booking.id)
            .ok_or_else(|| ApiError::not_found("Booking"))?;
        *stored = booking.clone();
        Ok(())
    }

    async fn list_bookings_for_user(&self, user_id: Uuid) -> ApiResult<Vec<Booking>> {
        let state = self.state.read().await;
        let mut found: Vec<Booking> = state
            .bookings
            .iter()
            .filter(|b| b.is_party(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const WORLD: BoundingBox = BoundingBox {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };

    fn service(flat_price: Decimal) -> Service {
        let now = Utc::now();
        Service {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            title: "Boiler repair".to_string(),
            category: "plumbing".to_string(),
            flat_price,
            latitude: 48.85,
            longitude: 2.35,
            service_radius_km: 10.0,
            base_duration_minutes: 45,
            instant_service_enabled: true,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_new_store_has_empty_catalog() {
        let store = MemoryStore::new();
        assert!(store.list_instant_services(WORLD, None).await.unwrap().is_empty());

        let listed = service(Decimal::new(4950, 2));
        store.insert_service(&listed).await.unwrap();
        let found = store.list_instant_services(WORLD, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, listed.id);
    }

    #[tokio::test]
    async fn test_sub_cent_flat_price_rejected() {
        let store = MemoryStore::new();
        let err = store
            .insert_service(&service(Decimal::new(49999, 3)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
        assert!(store.list_instant_services(WORLD, None).await.unwrap().is_empty());
    }
}

//! Instant-service dispatch: nearby discovery and on-demand booking

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use super::model::{InstantCandidate, ListInstantServicesQuery, RequestInstantServiceRequest};
use crate::booking::{Booking, BookingDraft, BookingService, InstantDetails};
use crate::error::{ApiError, ApiResult};
use crate::geo::{self, BoundingBox};
use crate::presence::PresenceService;
use crate::store::MarketStore;

#[derive(Clone)]
pub struct InstantDispatchService {
    store: Arc<dyn MarketStore>,
    presence: PresenceService,
    bookings: BookingService,
}

impl InstantDispatchService {
    pub fn new(
        store: Arc<dyn MarketStore>,
        presence: PresenceService,
        bookings: BookingService,
    ) -> Self {
        Self {
            store,
            presence,
            bookings,
        }
    }

    /// Book a service for right now, provided its provider is online and in
    /// range of the customer
    pub async fn request_instant_service(
        &self,
        client_id: Uuid,
        request: RequestInstantServiceRequest,
    ) -> ApiResult<Booking> {
        request.validate()?;
        let customer = request.location();

        let service = self
            .store
            .get_service(request.service_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Service"))?;

        if service.is_owned_by(client_id) {
            return Err(ApiError::forbidden("Cannot request your own service"));
        }
        if !service.active || !service.instant_service_enabled {
            return Err(ApiError::bad_request(
                "Service is not available for instant booking",
            ));
        }

        let presence = self
            .presence
            .available(service.provider_id)
            .await
            .ok_or_else(|| ApiError::bad_request("Provider is not currently available"))?;

        let distance_km = geo::distance_km(customer, presence.location);
        let reach_km = presence
            .service_radius_km
            .map_or(service.service_radius_km, |cap| cap.min(service.service_radius_km));
        if distance_km > reach_km {
            return Err(ApiError::bad_request(format!(
                "Provider is {:.1} km away, outside the {:.1} km service radius",
                distance_km, reach_km
            )));
        }

        let now = Utc::now();
        let minutes = request.urgency.estimated_minutes(service.base_duration_minutes);
        let estimated_arrival = now + Duration::seconds((minutes * 60.0).round() as i64);

        let draft = BookingDraft {
            client_id,
            service_id: service.id,
            date: now,
            negotiation_id: None,
            customer_location: Some(customer),
            instant: Some(InstantDetails {
                customer_location: customer,
                urgency: request.urgency,
                distance_km,
                estimated_arrival,
            }),
        };

        let booking = self.bookings.create_booking(draft).await?;

        tracing::info!(
            booking_id = %booking.id,
            provider_id = %service.provider_id,
            urgency = ?request.urgency,
            distance_km,
            eta_minutes = minutes,
            "Instant service requested"
        );

        Ok(booking)
    }

    /// Instant-enabled services near a point whose providers are online,
    /// nearest first
    pub async fn list_available_instant_services(
        &self,
        query: &ListInstantServicesQuery,
    ) -> ApiResult<Vec<InstantCandidate>> {
        let center = query.center()?;
        let radius_km = query.radius_km()?;

        let bbox = BoundingBox::around(center, radius_km);
        let services = self
            .store
            .list_instant_services(bbox, query.category.as_deref())
            .await?;

        let mut online = Vec::with_capacity(services.len());
        for service in services {
            if self.presence.available(service.provider_id).await.is_some() {
                online.push(service);
            }
        }

        let candidates: Vec<InstantCandidate> =
            geo::nearest_within(online, center, radius_km, |s| s.location())
                .into_iter()
                .map(|(service, distance)| InstantCandidate::new(service, distance))
                .collect();

        tracing::debug!(
            lat = center.lat,
            lon = center.lon,
            radius_km,
            found = candidates.len(),
            "Listed instant services"
        );

        Ok(candidates)
    }
}

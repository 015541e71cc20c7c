//! Instant-service request and listing models

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::booking::Urgency;
use crate::error::{ApiError, ApiResult};
use crate::geo::GeoPoint;
use crate::models::Service;

/// Search radius when the caller gives none
pub const DEFAULT_SEARCH_RADIUS_KM: f64 = 10.0;

/// Largest search radius accepted
pub const MAX_SEARCH_RADIUS_KM: f64 = 200.0;

/// Request DTO for an on-demand booking
#[derive(Debug, Deserialize, Validate)]
pub struct RequestInstantServiceRequest {
    pub service_id: Uuid,
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lon: f64,
    #[serde(default)]
    pub urgency: Urgency,
}

impl RequestInstantServiceRequest {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// Query parameters for the instant-service listing
#[derive(Debug, Default, Deserialize)]
pub struct ListInstantServicesQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius: Option<f64>,
    pub category: Option<String>,
}

impl ListInstantServicesQuery {
    /// Search center; both coordinates are required
    pub fn center(&self) -> ApiResult<GeoPoint> {
        let (Some(lat), Some(lon)) = (self.lat, self.lon) else {
            return Err(ApiError::bad_request("lat and lon are required"));
        };
        let center = GeoPoint::new(lat, lon);
        if !center.is_valid() {
            return Err(ApiError::bad_request("lat/lon out of range"));
        }
        Ok(center)
    }

    pub fn radius_km(&self) -> ApiResult<f64> {
        match self.radius {
            None => Ok(DEFAULT_SEARCH_RADIUS_KM),
            Some(r) if r.is_finite() && r > 0.0 && r <= MAX_SEARCH_RADIUS_KM => Ok(r),
            Some(_) => Err(ApiError::bad_request(format!(
                "radius must be between 0 and {} km",
                MAX_SEARCH_RADIUS_KM
            ))),
        }
    }
}

/// A service offered for instant dispatch, ranked by distance
#[derive(Debug, Clone, Serialize)]
pub struct InstantCandidate {
    #[serde(flatten)]
    pub service: Service,
    pub distance_km: f64,
    pub response_time_minutes: f64,
}

impl InstantCandidate {
    pub fn new(service: Service, distance_km: f64) -> Self {
        let response_time_minutes = f64::from(service.base_duration_minutes) + 2.0 * distance_km;
        Self {
            service,
            distance_km,
            response_time_minutes,
        }
    }
}

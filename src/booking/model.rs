//! Booking models and the instant-service status machine

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::geo::GeoPoint;

/// Booking status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    #[serde(alias = "in-progress")]
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Whether a provider may move a booking from `self` to `next`
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, InProgress)
                | (InProgress, Completed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

/// How quickly an instant request must be served
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(type_name = "urgency_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Normal,
    Urgent,
    Emergency,
}

impl Urgency {
    /// Promised arrival time for a service of `base_minutes`
    pub fn estimated_minutes(&self, base_minutes: i32) -> f64 {
        let base = f64::from(base_minutes);
        match self {
            Urgency::Normal => base,
            Urgency::Urgent => (base * 0.7).max(15.0),
            Urgency::Emergency => (base * 0.5).max(10.0),
        }
    }
}

/// Booking record
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub service_id: Uuid,
    /// The client who booked
    pub user_id: Uuid,
    pub provider_id: Uuid,
    pub date: DateTime<Utc>,
    /// List price at booking time
    pub original_price: Decimal,
    pub final_price: Decimal,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub negotiation_id: Option<Uuid>,
    pub is_instant: bool,
    pub customer_lat: Option<f64>,
    pub customer_lon: Option<f64>,
    pub urgency: Option<Urgency>,
    pub distance_km: Option<f64>,
    pub estimated_arrival: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn customer_location(&self) -> Option<GeoPoint> {
        match (self.customer_lat, self.customer_lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    pub fn booking_day(&self) -> NaiveDate {
        self.date.date_naive()
    }

    /// Client or assigned provider
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.user_id == user_id || self.provider_id == user_id
    }

    /// Apply a provider-driven status change, stamping arrival and completion
    pub fn advance(&mut self, next: BookingStatus, now: DateTime<Utc>) -> ApiResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ApiError::bad_request(format!(
                "Invalid status transition from {:?} to {:?}",
                self.status, next
            )));
        }

        match next {
            BookingStatus::InProgress => self.actual_arrival = Some(now),
            BookingStatus::Completed => self.completion_time = Some(now),
            _ => {}
        }

        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Inclusive UTC bounds of a calendar day
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
    let end = start + Duration::days(1) - Duration::nanoseconds(1);
    (start, end)
}

/// Instant-service details attached to a draft booking
#[derive(Debug, Clone)]
pub struct InstantDetails {
    pub customer_location: GeoPoint,
    pub urgency: Urgency,
    pub distance_km: f64,
    pub estimated_arrival: DateTime<Utc>,
}

/// Everything the booking engine needs to create a booking
#[derive(Debug, Clone)]
pub struct BookingDraft {
    pub client_id: Uuid,
    pub service_id: Uuid,
    pub date: DateTime<Utc>,
    pub negotiation_id: Option<Uuid>,
    pub customer_location: Option<GeoPoint>,
    pub instant: Option<InstantDetails>,
}

/// Request DTO for creating a booking
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: Uuid,
    pub date: DateTime<Utc>,
    pub negotiation_id: Option<Uuid>,
    pub location: Option<GeoPoint>,
}

impl CreateBookingRequest {
    pub fn into_draft(self, client_id: Uuid) -> ApiResult<BookingDraft> {
        if let Some(location) = &self.location {
            if !location.is_valid() {
                return Err(ApiError::ValidationError(
                    "location: coordinates out of range".to_string(),
                ));
            }
        }
        Ok(BookingDraft {
            client_id,
            service_id: self.service_id,
            date: self.date,
            negotiation_id: self.negotiation_id,
            customer_location: self.location,
            instant: None,
        })
    }
}

/// Request DTO for a provider status change
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: BookingStatus,
}

/// Booking events for real-time updates
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type")]
pub enum BookingEvent {
    Created {
        booking_id: Uuid,
        client_id: Uuid,
        provider_id: Uuid,
        status: BookingStatus,
    },
    StatusUpdated {
        booking_id: Uuid,
        client_id: Uuid,
        provider_id: Uuid,
        status: BookingStatus,
    },
}

//! Persistence seam for services, negotiations and bookings
//!
//! Implementations must enforce the marketplace's uniqueness rules themselves
//! (one active negotiation per service/client, one booking per negotiation,
//! one live booking per client per day) and report violations as
//! [`ApiError::Conflict`](crate::error::ApiError::Conflict), so races become
//! deterministic failures instead of duplicates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::Booking;
use crate::error::ApiResult;
use crate::geo::BoundingBox;
use crate::models::Service;
use crate::negotiation::{Negotiation, NegotiationStatus};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &'static str;

    async fn health_check(&self) -> ApiResult<()>;

    async fn get_service(&self, id: Uuid) -> ApiResult<Option<Service>>;

    async fn insert_service(&self, service: &Service) -> ApiResult<()>;

    /// Active, instant-enabled services whose location falls in `bbox`,
    /// optionally restricted to one category. Order is insertion order.
    async fn list_instant_services(
        &self,
        bbox: BoundingBox,
        category: Option<&str>,
    ) -> ApiResult<Vec<Service>>;

    async fn get_negotiation(&self, id: Uuid) -> ApiResult<Option<Negotiation>>;

    async fn find_active_negotiation(
        &self,
        service_id: Uuid,
        client_id: Uuid,
    ) -> ApiResult<Option<Negotiation>>;

    async fn insert_negotiation(&self, negotiation: &Negotiation) -> ApiResult<()>;

    /// Persist a mutated negotiation whose `version` was bumped from
    /// `expected_version`. Fails with a conflict if another writer got there
    /// first.
    async fn update_negotiation(
        &self,
        negotiation: &Negotiation,
        expected_version: i64,
    ) -> ApiResult<()>;

    async fn delete_negotiation(&self, id: Uuid) -> ApiResult<bool>;

    /// Negotiations where `user_id` is client or provider, newest first
    async fn list_negotiations_for_user(
        &self,
        user_id: Uuid,
        status: Option<NegotiationStatus>,
    ) -> ApiResult<Vec<Negotiation>>;

    async fn get_booking(&self, id: Uuid) -> ApiResult<Option<Booking>>;

    async fn find_booking_by_negotiation(&self, negotiation_id: Uuid)
        -> ApiResult<Option<Booking>>;

    /// Non-cancelled bookings of `client_id` dated within `[start, end]`
    async fn bookings_for_client_between(
        &self,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<Vec<Booking>>;

    /// Insert a booking. When it references a negotiation, the negotiation is
    /// moved from `completed` to `booked` in the same transaction; if it is no
    /// longer `completed` nothing is written and a conflict is returned.
    async fn create_booking(&self, booking: &Booking) -> ApiResult<()>;

    async fn update_booking(&self, booking: &Booking) -> ApiResult<()>;

    /// Bookings where `user_id` is client or provider, newest first
    async fn list_bookings_for_user(&self, user_id: Uuid) -> ApiResult<Vec<Booking>>;
}

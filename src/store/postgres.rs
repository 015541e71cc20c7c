//! PostgreSQL implementation of [`MarketStore`]
//!
//! Uniqueness is enforced by indexes (see `migrations/`), and the
//! booking + negotiation write runs in one transaction holding a row lock on
//! the negotiation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::MarketStore;
use crate::booking::Booking;
use crate::error::{ApiError, ApiResult};
use crate::geo::BoundingBox;
use crate::models::{check_price_scale, Service};
use crate::negotiation::{Negotiation, NegotiationStatus};

/// Store backed by a Postgres connection pool
#[derive(Clone)]
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db_pool
    }
}

#[async_trait]
impl MarketStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> ApiResult<()> {
        sqlx::query("SELECT 1").execute(&self.db_pool).await?;
        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> ApiResult<Option<Service>> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(service)
    }

    async fn insert_service(&self, service: &Service) -> ApiResult<()> {
        check_price_scale(service.flat_price)?;
        sqlx::query(
            r#"
            INSERT INTO services (
                id, provider_id, title, category, flat_price, latitude, longitude,
                service_radius_km, base_duration_minutes, instant_service_enabled,
                active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(service.id)
        .bind(service.provider_id)
        .bind(&service.title)
        .bind(&service.category)
        .bind(service.flat_price)
        .bind(service.latitude)
        .bind(service.longitude)
        .bind(service.service_radius_km)
        .bind(service.base_duration_minutes)
        .bind(service.instant_service_enabled)
        .bind(service.active)
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn list_instant_services(
        &self,
        bbox: BoundingBox,
        category: Option<&str>,
    ) -> ApiResult<Vec<Service>> {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "SELECT * FROM services WHERE active AND instant_service_enabled",
        );

        query_builder.push(" AND latitude BETWEEN ");
        query_builder.push_bind(bbox.min_lat);
        query_builder.push(" AND ");
        query_builder.push_bind(bbox.max_lat);

        // Boxes crossing the antimeridian are narrowed in Rust below
        if !bbox.wraps() {
            query_builder.push(" AND longitude BETWEEN ");
            query_builder.push_bind(bbox.min_lon);
            query_builder.push(" AND ");
            query_builder.push_bind(bbox.max_lon);
        }

        if let Some(category) = category {
            query_builder.push(" AND category = ");
            query_builder.push_bind(category);
        }

        query_builder.push(" ORDER BY created_at ASC, id ASC");

        let mut services = query_builder
            .build_query_as::<Service>()
            .fetch_all(&self.db_pool)
            .await?;

        services.retain(|s| bbox.contains(s.location()));
        Ok(services)
    }

    async fn get_negotiation(&self, id: Uuid) -> ApiResult<Option<Negotiation>> {
        let negotiation =
            sqlx::query_as::<_, Negotiation>("SELECT * FROM negotiations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(negotiation)
    }

    async fn find_active_negotiation(
        &self,
        service_id: Uuid,
        client_id: Uuid,
    ) -> ApiResult<Option<Negotiation>> {
        let negotiation = sqlx::query_as::<_, Negotiation>(
            r#"
            SELECT * FROM negotiations
            WHERE service_id = $1 AND client_id = $2 AND status = 'active'
            "#,
        )
        .bind(service_id)
        .bind(client_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(negotiation)
    }

    async fn insert_negotiation(&self, negotiation: &Negotiation) -> ApiResult<()> {
        sqlx::query(
            r#"
            INSERT INTO negotiations (
                id, service_id, client_id, provider_id, base_price, current_offer,
                offers, status, final_price, cancel_reason, pending_to_client,
                pending_to_provider, expires_at, completed_at, version,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(negotiation.id)
        .bind(negotiation.service_id)
        .bind(negotiation.client_id)
        .bind(negotiation.provider_id)
        .bind(negotiation.base_price)
        .bind(negotiation.current_offer)
        .bind(Json(&negotiation.offers))
        .bind(negotiation.status)
        .bind(negotiation.final_price)
        .bind(&negotiation.cancel_reason)
        .bind(negotiation.pending_to_client)
        .bind(negotiation.pending_to_provider)
        .bind(negotiation.expires_at)
        .bind(negotiation.completed_at)
        .bind(negotiation.version)
        .bind(negotiation.created_at)
        .bind(negotiation.updated_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn update_negotiation(
        &self,
        negotiation: &Negotiation,
        expected_version: i64,
    ) -> ApiResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE negotiations
            SET current_offer = $1, offers = $2, status = $3, final_price = $4,
                cancel_reason = $5, pending_to_client = $6, pending_to_provider = $7,
                completed_at = $8, version = $9, updated_at = $10
            WHERE id = $11 AND version = $12
            "#,
        )
        .bind(negotiation.current_offer)
        .bind(Json(&negotiation.offers))
        .bind(negotiation.status)
        .bind(negotiation.final_price)
        .bind(&negotiation.cancel_reason)
        .bind(negotiation.pending_to_client)
        .bind(negotiation.pending_to_provider)
        .bind(negotiation.completed_at)
        .bind(negotiation.version)
        .bind(negotiation.updated_at)
        .bind(negotiation.id)
        .bind(expected_version)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::conflict(
                "Negotiation was modified concurrently, retry",
            ));
        }

        Ok(())
    }

    async fn delete_negotiation(&self, id: Uuid) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM negotiations WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_negotiations_for_user(
        &self,
        user_id: Uuid,
        status: Option<NegotiationStatus>,
    ) -> ApiResult<Vec<Negotiation>> {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM negotiations WHERE (client_id = ");
        query_builder.push_bind(user_id);
        query_builder.push(" OR provider_id = ");
        query_builder.push_bind(user_id);
        query_builder.push(")");

        if let Some(status) = status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }

        query_builder.push(" ORDER BY created_at DESC");

        let negotiations = query_builder
            .build_query_as::<Negotiation>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(negotiations)
    }

    async fn get_booking(&self, id: Uuid) -> ApiResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(booking)
    }

    async fn find_booking_by_negotiation(
        &self,
        negotiation_id: Uuid,
    ) -> ApiResult<Option<Booking>> {
        let booking =
            sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE negotiation_id = $1")
                .bind(negotiation_id)
                .fetch_optional(&self.db_pool)
                .await?;

        Ok(booking)
    }

    async fn bookings_for_client_between(
        &self,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE user_id = $1 AND date BETWEEN $2 AND $3 AND status <> 'cancelled'
            ORDER BY date ASC
            "#,
        )
        .bind(client_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(bookings)
    }

    async fn create_booking(&self, booking: &Booking) -> ApiResult<()> {
        let mut tx = self.db_pool.begin().await?;

        if let Some(negotiation_id) = booking.negotiation_id {
            let status = sqlx::query_as::<_, (NegotiationStatus,)>(
                "SELECT status FROM negotiations WHERE id = $1 FOR UPDATE",
            )
            .bind(negotiation_id)
            .fetch_optional(&mut *tx)
            .await?;

            match status {
                None => return Err(ApiError::not_found("Negotiation")),
                Some((NegotiationStatus::Completed,)) => {}
                Some(_) => {
                    return Err(ApiError::conflict(
                        "Negotiation is no longer available for booking",
                    ))
                }
            }
        }

        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, service_id, user_id, provider_id, date, booking_day,
                original_price, final_price, total_amount, status, negotiation_id,
                is_instant, customer_lat, customer_lon, urgency, distance_km,
                estimated_arrival, actual_arrival, completion_time,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(booking.id)
        .bind(booking.service_id)
        .bind(booking.user_id)
        .bind(booking.provider_id)
        .bind(booking.date)
        .bind(booking.booking_day())
        .bind(booking.original_price)
        .bind(booking.final_price)
        .bind(booking.total_amount)
        .bind(booking.status)
        .bind(booking.negotiation_id)
        .bind(booking.is_instant)
        .bind(booking.customer_lat)
        .bind(booking.customer_lon)
        .bind(booking.urgency)
        .bind(booking.distance_km)
        .bind(booking.estimated_arrival)
        .bind(booking.actual_arrival)
        .bind(booking.completion_time)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await?;

        if let Some(negotiation_id) = booking.negotiation_id {
            sqlx::query(
                r#"
                UPDATE negotiations
                SET status = 'booked', version = version + 1, updated_at = $1
                WHERE id = $2
                "#,
            )
            .bind(booking.created_at)
            .bind(negotiation_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn update_booking(&self, booking: &Booking) -> ApiResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $1, actual_arrival = $2, completion_time = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(booking.status)
        .bind(booking.actual_arrival)
        .bind(booking.completion_time)
        .bind(booking.updated_at)
        .bind(booking.id)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Booking"));
        }

        Ok(())
    }

    async fn list_bookings_for_user(&self, user_id: Uuid) -> ApiResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE user_id = $1 OR provider_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(bookings)
    }
}

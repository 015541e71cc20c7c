//! Shared data models for the marketplace backend

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::geo::GeoPoint;

/// Marketplace roles carried in the bearer token
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Client,
    Provider,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Client => "client",
            UserRole::Provider => "provider",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client" => Some(UserRole::Client),
            "provider" => Some(UserRole::Provider),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// A provider's listed service. Owned by the provider; engines only read it.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Service {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub title: String,
    pub category: String,
    pub flat_price: Decimal,
    pub latitude: f64,
    pub longitude: f64,
    pub service_radius_km: f64,
    pub base_duration_minutes: i32,
    pub instant_service_enabled: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Prices are stored with exactly this many decimal places
pub const PRICE_SCALE: u32 = 2;

/// Reject amounts finer than one cent, which storage would silently round
pub fn check_price_scale(price: Decimal) -> ApiResult<()> {
    if price.normalize().scale() > PRICE_SCALE {
        return Err(ApiError::ValidationError(format!(
            "Price {} has more than {} decimal places",
            price, PRICE_SCALE
        )));
    }
    Ok(())
}

impl Service {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.provider_id == user_id
    }
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

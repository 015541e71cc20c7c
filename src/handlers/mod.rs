//! API handlers for the marketplace backend

pub mod booking;
pub mod health;
pub mod instant;
pub mod negotiation;
pub mod presence;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::error::ApiError;
use crate::models::ApiResponse;

pub use booking::*;
pub use health::health_check;
pub use instant::*;
pub use negotiation::*;
pub use presence::*;

// Re-export AuthenticatedUser from middleware for handler use
pub use crate::middleware::auth::{AuthenticatedUser, ProviderUser};

/// JSON body extractor whose rejections use the API error format
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state)
            .await
            .map_err(|e| ApiError::ValidationError(e.body_text()))?;
        Ok(ApiJson(value))
    }
}

pub type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T: Serialize>(data: T) -> Reply<T> {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

fn created<T: Serialize>(data: T) -> Reply<T> {
    (StatusCode::CREATED, Json(ApiResponse::ok(data)))
}

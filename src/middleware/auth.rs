//! Authentication extractors
//!
//! Verify the bearer token and hand handlers the caller's identity.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthService, JwtError};
use crate::models::UserRole;

/// Authenticated user extracted from the JWT
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: UserRole,
}

/// Error response for authentication failures
#[derive(Debug, Serialize)]
struct AuthError {
    error: AuthErrorDetails,
}

#[derive(Debug, Serialize)]
struct AuthErrorDetails {
    code: String,
    message: String,
}

impl AuthError {
    fn response(status: StatusCode, code: &str, message: &str) -> Response {
        let body = Self {
            error: AuthErrorDetails {
                code: code.to_string(),
                message: message.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }

    fn unauthorized(code: &str, message: &str) -> Response {
        Self::response(StatusCode::UNAUTHORIZED, code, message)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AuthError::unauthorized(
                        "MISSING_TOKEN",
                        "Authorization header with Bearer token required",
                    )
                })?;

        let auth_service = Arc::<AuthService>::from_ref(state);

        let identity = auth_service.authenticate(bearer.token()).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            match e {
                JwtError::TokenExpired => {
                    AuthError::unauthorized("TOKEN_EXPIRED", "Token has expired")
                }
                _ => AuthError::unauthorized("INVALID_TOKEN", "Invalid token"),
            }
        })?;

        Ok(AuthenticatedUser {
            user_id: identity.user_id,
            role: identity.role,
        })
    }
}

/// Caller that must hold the provider role
#[derive(Debug, Clone, Copy)]
pub struct ProviderUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for ProviderUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        if user.role != UserRole::Provider {
            return Err(AuthError::response(
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Provider role required",
            ));
        }

        Ok(ProviderUser(user))
    }
}

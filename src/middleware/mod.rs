//! HTTP middleware: request tracing, rate limiting, security headers and
//! authentication extractors

pub mod auth;
mod rate_limiter;
mod security;
mod tracing;

use axum::http::HeaderMap;

pub use auth::{AuthenticatedUser, ProviderUser};
pub use rate_limiter::{rate_limit, RateLimiter};
pub use security::{hsts_header, security_headers};
pub use tracing::request_tracing;

/// Client address from proxy headers, if any
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next() {
            return Some(ip.trim().to_string());
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
}

//! Authentication service
//!
//! Resolves bearer tokens into the caller's identity. Accounts live in the
//! identity provider, so there is no user table here.

use uuid::Uuid;

use super::jwt::{generate_access_token, verify_token, JwtError};
use crate::config::Config;
use crate::models::UserRole;

/// Caller identity carried by a verified token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: UserRole,
}

pub struct AuthService {
    jwt_secret: String,
    access_token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(jwt_secret: impl Into<String>, access_token_ttl_seconds: i64) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_token_ttl_seconds,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.jwt_secret.clone(), config.jwt_access_token_ttl_seconds)
    }

    /// Mint an access token; used by local tooling and tests
    pub fn issue_token(&self, user_id: Uuid, role: UserRole) -> Result<String, JwtError> {
        generate_access_token(user_id, role, &self.jwt_secret, self.access_token_ttl_seconds)
    }

    pub fn authenticate(&self, token: &str) -> Result<Identity, JwtError> {
        let claims = verify_token(token, &self.jwt_secret)?;
        Ok(Identity {
            user_id: claims.user_id()?,
            role: claims.user_role()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_authenticate() {
        let auth = AuthService::new("secret", 60);
        let user_id = Uuid::new_v4();
        let token = auth.issue_token(user_id, UserRole::Client).unwrap();

        let identity = auth.authenticate(&token).unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.role, UserRole::Client);
    }

    #[test]
    fn test_foreign_token_rejected() {
        let other = AuthService::new("other", 60);
        let token = other.issue_token(Uuid::new_v4(), UserRole::Admin).unwrap();
        assert!(AuthService::new("secret", 60).authenticate(&token).is_err());
    }
}

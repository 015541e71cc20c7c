//! Bearer-token authentication
//!
//! - JWT (HS256) verification and issuance
//! - Resolution of a token into `{ user_id, role }`

mod jwt;
mod service;

pub use jwt::{generate_access_token, verify_token, Claims, JwtError};
pub use service::{AuthService, Identity};

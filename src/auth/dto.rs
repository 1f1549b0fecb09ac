use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::jwt::IssuedToken;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub username: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by login and refresh.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub code: u16,
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expire: OffsetDateTime,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            code: 200,
            token: issued.token,
            expire: issued.expire,
        }
    }
}

use serde::{Deserialize, Serialize};

/// JWT payload used for authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,       // user ID
    pub iat: i64,      // issued at (unix timestamp)
    pub exp: i64,      // expires at (unix timestamp)
    pub orig_iat: i64, // first issuance; bounds refreshes
}

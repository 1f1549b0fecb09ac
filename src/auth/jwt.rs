use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use super::claims::Claims;
use super::keys::SigningKeys;
use crate::config::{JwtConfig, MAX_TOKEN_MINUTES};
use crate::error::ApiError;

pub const TOKEN_QUERY_PARAM: &str = "token";
pub const TOKEN_COOKIE: &str = "jwt";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing failed: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("token is past its refresh window")]
    RefreshExpired,
}

/// A freshly signed token and its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expire: OffsetDateTime,
}

/// Issues and verifies RS256 bearer tokens.
///
/// A token is valid iff its signature checks out against the public key,
/// `exp` is strictly in the future and it carries a positive `id`. A token
/// can be refreshed, even after expiry, until `orig_iat + max_refresh`.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<SigningKeys>,
    ttl: Duration,
    max_refresh: Duration,
}

impl TokenService {
    pub fn new(keys: SigningKeys, ttl: Duration, max_refresh: Duration) -> Self {
        Self {
            keys: Arc::new(keys),
            ttl,
            max_refresh,
        }
    }

    /// Minutes outside `1..=MAX_TOKEN_MINUTES` are clamped into it.
    pub fn from_config(keys: SigningKeys, cfg: &JwtConfig) -> Self {
        let minutes = |m: i64| Duration::minutes(m.clamp(1, MAX_TOKEN_MINUTES));
        Self::new(
            keys,
            minutes(cfg.ttl_minutes),
            minutes(cfg.max_refresh_minutes),
        )
    }

    /// Claims for `user_id` issued at `now`.
    pub fn payload(&self, user_id: i64, now: OffsetDateTime, orig_iat: i64) -> Claims {
        Claims {
            id: user_id,
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
            orig_iat,
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<IssuedToken, TokenError> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, user_id: i64, now: OffsetDateTime) -> Result<IssuedToken, TokenError> {
        let claims = self.payload(user_id, now, now.unix_timestamp());
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<IssuedToken, TokenError> {
        let token = encode(&Header::new(Algorithm::RS256), claims, &self.keys.encoding)
            .map_err(TokenError::Sign)?;
        let expire =
            OffsetDateTime::from_unix_timestamp(claims.exp).map_err(|_| TokenError::Invalid)?;
        debug!(user_id = claims.id, "jwt signed");
        Ok(IssuedToken { token, expire })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let claims = self.decode_signed(token)?;
        if claims.exp <= now.unix_timestamp() {
            return Err(TokenError::Expired);
        }
        debug!(user_id = claims.id, "jwt verified");
        Ok(claims)
    }

    pub fn refresh(&self, token: &str) -> Result<IssuedToken, TokenError> {
        self.refresh_at(token, OffsetDateTime::now_utc())
    }

    /// Reissues `token` with a new expiry. The window is measured from the
    /// original issuance, so repeated refreshes cannot extend it.
    pub fn refresh_at(&self, token: &str, now: OffsetDateTime) -> Result<IssuedToken, TokenError> {
        let claims = self.decode_signed(token)?;
        if now.unix_timestamp() > claims.orig_iat + self.max_refresh.whole_seconds() {
            return Err(TokenError::RefreshExpired);
        }
        let renewed = self.payload(claims.id, now, claims.orig_iat);
        self.sign(&renewed)
    }

    // Signature and shape only; expiry is checked by the callers against
    // their own clock.
    fn decode_signed(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);
        let data = decode::<Claims>(token, &self.keys.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            TokenError::Invalid
        })?;
        if data.claims.id <= 0 {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }
}

/// Finds the bearer token: `Authorization: Bearer <token>` header, then the
/// `token` query parameter, then the `jwt` cookie. First match wins.
pub fn lookup_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);
    if from_header.is_some() {
        return from_header;
    }

    let from_query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(mut q)| q.remove(TOKEN_QUERY_PARAM))
        .filter(|t| !t.is_empty());
    if from_query.is_some() {
        return from_query;
    }

    CookieJar::from_headers(&parts.headers)
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Extracts and validates the bearer token, returning the user ID.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

/// The raw bearer token of the request, not validated.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenService::from_ref(state);
        let token = lookup_token(parts).ok_or_else(|| {
            debug!("no bearer token in request");
            ApiError::Unauthorized
        })?;

        let claims = tokens.verify(&token).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            ApiError::Unauthorized
        })?;

        Ok(AuthUser(claims.id))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        lookup_token(parts)
            .map(BearerToken)
            .ok_or(ApiError::Unauthorized)
    }
}

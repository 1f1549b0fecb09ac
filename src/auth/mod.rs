use crate::state::AppState;
use axum::Router;

pub mod claims;
mod dto;
pub mod handlers;
pub mod jwt;
pub mod keys;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;

/// Routes reachable without a token.
pub fn public_router() -> Router<AppState> {
    handlers::public_routes()
}

/// Routes that require a bearer token.
pub fn token_router() -> Router<AppState> {
    handlers::token_routes()
}

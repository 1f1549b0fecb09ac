mod dto;
pub mod handlers;
pub mod naming;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod upload;

use crate::state::AppState;
use axum::Router;

pub fn router(body_limit_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes(body_limit_bytes))
}

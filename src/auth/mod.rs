use crate::state::AppState;
use axum::Router;

mod claims;
pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod mail;
#[cfg(test)]
pub mod memory;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod tokens;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}

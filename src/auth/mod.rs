use crate::state::AppState;
use axum::Router;

pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod password;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::router()
}

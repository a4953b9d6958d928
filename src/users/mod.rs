pub mod handlers;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::router()
}

pub fn public_router() -> Router<AppState> {
    handlers::public_router()
}

//! HTTP route handlers.

pub mod health;
mod helpers;
pub mod menu;
pub mod role;

use axum::Router;

use crate::state::AppState;

/// All API routes, without middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(menu::router())
        .merge(role::router())
}

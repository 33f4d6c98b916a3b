//! Vitalis kernel library.
//!
//! Role-based menu and permission tree engine behind the admin API. The
//! `vitalis` binary wraps [`app`] in [`cors_layer`] and serves it.

pub mod config;
pub mod db;
pub mod error;
pub mod menu;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod routes;
pub mod state;
pub mod storage;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::state::AppState;

/// The API router with authentication and request tracing applied.
pub fn app(state: AppState) -> Router {
    routes::router()
        // Middleware layers (last added = first executed in request flow):
        // TraceLayer → bearer auth → routes
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate_bearer_token,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy for the configured origins.
///
/// A lone `*` allows any origin without credentials. An explicit origin list
/// allows credentials, which rules out wildcard headers, so the request
/// headers the API reads are listed instead.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if config.cors_allowed_origins.len() == 1 && config.cors_allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
            .allow_credentials(true)
    }
}

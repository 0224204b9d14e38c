//! Bookstore Storefront library.
//!
//! Server-rendered storefront for a remote book and cart API. This crate
//! provides the storefront as a library so the router can be tested in-process
//! and the binary stays a thin shell.
//!
//! # Architecture
//!
//! - [`bookstore::BookstoreClient`] talks to the remote REST API
//! - [`query::QueryCache`] deduplicates, caches and invalidates its responses
//! - [`bookstore::BookStore`] ties the two together for handlers
//! - [`routes`] render askama pages and HTMX fragments

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod bookstore;
pub mod config;
pub mod error;
pub mod middleware;
pub mod query;
pub mod routes;
pub mod state;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Directory static assets are served from, relative to the workspace root.
pub const STATIC_DIR: &str = "crates/storefront/static";

/// Build the full storefront router.
///
/// Sentry layers are added by the binary so tests do not need a Sentry hub.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .with_state(state)
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Lists books directly through the client, bypassing the cache, and returns
/// 503 Service Unavailable if the remote store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().client().list_books().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!("Readiness check failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

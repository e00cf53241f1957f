use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::document::DocumentGateway;
use crate::handlers;
use crate::store::SessionStore;
use crate::turn::TurnEngine;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub engine: Arc<TurnEngine>,
    pub documents: Arc<DocumentGateway>,
    pub keep_alive_interval_seconds: u64,
    pub max_connections: usize,
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let max_connections = state.max_connections;

    // Turns are bounded by the engine's own timeout; a request timeout here
    // would cut streams short.
    let streaming_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/create_session", post(handlers::create_session))
        .route("/sessions/{session_id}/messages", get(handlers::get_messages))
        .route("/artifacts", get(handlers::list_artifacts))
        .route("/artifacts/{name}", get(handlers::download_artifact))
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    let api = Router::new()
        .merge(streaming_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024)) // 2 MB
        .layer(ConcurrencyLimitLayer::new(max_connections))
        // Browser frontends are served from other origins.
        .layer(CorsLayer::permissive());

    Router::new().nest("/api", api)
}

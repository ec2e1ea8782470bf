//! API route definitions
//!
//! - /api/v1/clustering - single-sample classification
//! - /api/v1/models/info - fitted model metadata
//! - /api/v1/session/* - streaming session polling and control
//! - /health - service health at root level

use axum::{routing::{get, post}, Router};

use super::handlers::{self, ApiState};

/// Routes nested under `/api/v1`
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/clustering", post(handlers::classify))
        .route("/models/info", get(handlers::get_model_info))
        // Session polling
        .route("/session", get(handlers::get_session))
        .route("/session/samples", get(handlers::get_samples))
        .route("/session/counts", get(handlers::get_counts))
        // Session control
        .route("/session/stream", post(handlers::start_stream))
        .route("/session/stop", post(handlers::stop_stream))
        .route("/session/reset", post(handlers::reset_session))
        .with_state(state)
}

/// Health endpoint at root level
pub fn legacy_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state)
}

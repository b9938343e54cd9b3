//! API route definitions
//!
//! - /api/v1/predict - multipart EDF upload, returns a Report
//! - /api/v1/model - loaded model contract
//! - /health - liveness at root level

use axum::{routing::{get, post}, Router};

use super::handlers::{self, ApiState};

/// Versioned API routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/predict", post(handlers::predict))
        .route("/model", get(handlers::get_model))
        .with_state(state)
}

/// Root-level health endpoint
pub fn root_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state)
}

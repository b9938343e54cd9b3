//! REST API module using Axum
//!
//! A thin HTTP surface over the screening pipeline:
//! - `/api/v1/predict` and `/api/v1/model`
//! - `/health` at root level
//! - `/artifacts/*` when the local blob store is active

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `DIAGNOS_CORS_ORIGINS` to a comma-separated list of allowed origins
/// when a browser front end is served from elsewhere.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("DIAGNOS_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        }
        Err(_) => CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]),
    }
}

/// Create the application router.
///
/// `max_upload_bytes` bounds every request body; larger uploads get 413.
pub fn create_app(state: ApiState, max_upload_bytes: usize) -> Router {
    let artifact_dir = state.artifact_dir.clone();

    let mut app = Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::root_routes(state));

    if let Some(dir) = artifact_dir {
        tracing::info!(dir = %dir.display(), "Serving artifacts at /artifacts");
        app = app.nest_service("/artifacts", ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}

//! API route handlers
//!
//! - `POST /api/v1/predict`: multipart upload, field `file`, screened end to end
//! - `GET /api/v1/model`: loaded model contract
//! - `GET /health`: liveness, admission load and model summary

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::ServiceConfig;
use crate::error::PipelineError;
use crate::ml_engine::ModelSummary;
use crate::pipeline::{Orchestrator, StagingArea};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub staging: StagingArea,
    /// One permit per in-flight screening
    pub admission: Arc<Semaphore>,
    pub max_concurrent: usize,
    pub admission_timeout: Duration,
    /// Directory served under `/artifacts` (local blob store only)
    pub artifact_dir: Option<PathBuf>,
    pub started: Instant,
}

impl ApiState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        staging: StagingArea,
        max_concurrent: usize,
        admission_timeout: Duration,
    ) -> Self {
        Self {
            orchestrator,
            staging,
            admission: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            admission_timeout,
            artifact_dir: None,
            started: Instant::now(),
        }
    }

    /// Build from the service configuration.
    pub fn from_config(orchestrator: Arc<Orchestrator>, config: &ServiceConfig) -> Self {
        let staging = StagingArea::new(
            config.server.staging_dir.as_ref().map(PathBuf::from),
            crate::config::defaults::UPLOAD_EXTENSION,
        );
        let mut state = Self::new(
            orchestrator,
            staging,
            config.server.max_concurrent_requests,
            Duration::from_secs(config.server.admission_timeout_secs),
        );
        if config.artifacts.backend == crate::config::BlobBackend::Local {
            state.artifact_dir = Some(PathBuf::from(&config.artifacts.local_dir));
        }
        state
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }
}

// ============================================================================
// Predict
// ============================================================================

/// POST /api/v1/predict - Screen one uploaded EDF recording
pub async fn predict(State(state): State<ApiState>, multipart: Result<Multipart, MultipartRejection>) -> Response {
    let permit = match tokio::time::timeout(state.admission_timeout, state.admission.clone().acquire_owned()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) | Err(_) => {
            warn!(
                max_concurrent = state.max_concurrent,
                waited_ms = state.admission_timeout.as_millis() as u64,
                "Screening request rejected, service busy"
            );
            return ApiErrorResponse::busy("too many screenings in progress, retry later");
        }
    };

    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    let (filename, bytes) = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => break (filename, bytes),
                    Err(e) => return ApiErrorResponse::bad_request(format!("failed to read upload: {e}")),
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) => return ApiErrorResponse::bad_request("no file part"),
            Err(e) => return ApiErrorResponse::bad_request(format!("malformed multipart body: {e}")),
        }
    };
    debug!(file = %filename, bytes = bytes.len(), "Upload received");

    let staging = state.staging.clone();
    let upload = match tokio::task::spawn_blocking(move || staging.stage(&filename, &bytes)).await {
        Ok(Ok(u)) => u,
        Ok(Err(e)) => return e.into_response(),
        Err(e) => return PipelineError::Internal(format!("staging task failed: {e}")).into_response(),
    };

    let outcome = state.orchestrator.run(upload).await;
    drop(permit);

    match outcome {
        Ok(report) => Json(report).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Model / Health
// ============================================================================

/// GET /api/v1/model - Loaded model contract
pub async fn get_model(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.orchestrator.classifier().summary())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub in_flight: usize,
    pub max_concurrent: usize,
    pub model: ModelSummary,
}

/// GET /health - Liveness with loaded model summary
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
        in_flight: state.max_concurrent.saturating_sub(state.admission.available_permits()),
        max_concurrent: state.max_concurrent,
        model: state.orchestrator.classifier().summary(),
    })
}

//! Response envelopes and error mapping.
//!
//! Successful screening responses are the bare [`Report`](crate::types::Report)
//! JSON. Metadata endpoints use [`ApiResponse`]; every error uses
//! [`ApiErrorResponse`]: `{ "error": { "code", "message" }, "meta": { ... } }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

use crate::error::PipelineError;

/// Metadata included in enveloped responses.
#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    pub version: &'static str,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// `{ "data": T, "meta": { ... } }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        let body = Self {
            data,
            meta: ResponseMeta::default(),
        };
        (StatusCode::OK, axum::Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl ApiErrorResponse {
    fn build(status: StatusCode, code: &str, msg: impl Into<String>) -> Response {
        let body = Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: msg.into(),
            },
            meta: ResponseMeta::default(),
        };
        (status, axum::Json(body)).into_response()
    }

    pub fn bad_request(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::BAD_REQUEST, "INPUT_ERROR", msg)
    }

    /// Admission timed out: too many screenings in flight.
    pub fn busy(msg: impl Into<String>) -> Response {
        Self::build(StatusCode::SERVICE_UNAVAILABLE, "BUSY", msg)
    }

    pub fn from_pipeline(err: &PipelineError) -> Response {
        Self::build(status_for(err), err.code(), err.to_string())
    }
}

/// HTTP status for a pipeline failure.
pub fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Input(_) => StatusCode::BAD_REQUEST,
        PipelineError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::SchemaMismatch { .. }
        | PipelineError::ModelUnavailable { .. }
        | PipelineError::Staging(_)
        | PipelineError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        PipelineError::StorageUnavailable(_) | PipelineError::NarrativeUnavailable(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        ApiErrorResponse::from_pipeline(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ok_response_shape() {
        let resp = ApiResponse::ok(serde_json::json!({"labels": ["a", "b"]}));
        assert_eq!(resp.status(), StatusCode::OK);
        let v = json(resp).await;
        assert_eq!(v["data"]["labels"][1], "b");
        assert!(v["meta"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_pipeline_errors_map_to_codes() {
        let resp = ApiErrorResponse::from_pipeline(&PipelineError::InsufficientData { samples: 10, window: 1280 });
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let v = json(resp).await;
        assert_eq!(v["error"]["code"], "INSUFFICIENT_DATA");
        assert!(v["error"]["message"].as_str().unwrap().contains("1280"));

        let resp = PipelineError::SchemaMismatch { expected: 247, actual: 256 }.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(resp).await["error"]["code"], "SCHEMA_MISMATCH");

        let resp = PipelineError::Staging("no space left on device".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(resp).await["error"]["code"], "STAGING_ERROR");
    }

    #[tokio::test]
    async fn test_busy_and_bad_request() {
        let resp = ApiErrorResponse::busy("later");
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(resp).await["error"]["code"], "BUSY");

        let resp = ApiErrorResponse::bad_request("no file");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(resp).await["error"]["code"], "INPUT_ERROR");
    }
}

//! Pipeline error taxonomy
//!
//! Every failure a request can hit maps to exactly one variant. Callers use
//! [`PipelineError::is_required_path`] to decide between aborting the request
//! and degrading the report.

use thiserror::Error;

/// Errors raised by the screening pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing, empty or malformed upload (wrong container format included).
    #[error("Invalid input: {0}")]
    Input(String),

    /// Recording shorter than one analysis window.
    #[error("Insufficient data: recording has {samples} samples, one window needs {window}")]
    InsufficientData { samples: usize, window: usize },

    /// Feature row width disagrees with the model's trained input dimension.
    #[error("Schema mismatch: model expects {expected} features per row, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    /// Classifier could not be loaded. Fatal at startup.
    #[error("Model unavailable ({path}): {reason}")]
    ModelUnavailable { path: String, reason: String },

    /// Artifact rendering or blob upload failed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Generative text service failed or timed out.
    #[error("Narrative service unavailable: {0}")]
    NarrativeUnavailable(String),

    /// Server-side failure writing or reading the staged upload.
    #[error("Staging failed: {0}")]
    Staging(String),

    /// Processing task was cancelled before it finished.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether this error belongs to a required stage (aborts the request).
    pub fn is_required_path(&self) -> bool {
        !matches!(
            self,
            PipelineError::StorageUnavailable(_) | PipelineError::NarrativeUnavailable(_)
        )
    }

    /// Whether the caller caused the failure (4xx) rather than the service (5xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::Input(_) | PipelineError::InsufficientData { .. }
        )
    }

    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Input(_) => "INPUT_ERROR",
            PipelineError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            PipelineError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            PipelineError::ModelUnavailable { .. } => "MODEL_UNAVAILABLE",
            PipelineError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            PipelineError::NarrativeUnavailable(_) => "NARRATIVE_UNAVAILABLE",
            PipelineError::Staging(_) => "STAGING_ERROR",
            PipelineError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_stage_errors_are_not_required_path() {
        assert!(!PipelineError::StorageUnavailable("down".into()).is_required_path());
        assert!(!PipelineError::NarrativeUnavailable("429".into()).is_required_path());
        assert!(PipelineError::Input("empty".into()).is_required_path());
        assert!(PipelineError::SchemaMismatch { expected: 247, actual: 256 }.is_required_path());
    }

    #[test]
    fn test_client_vs_server_classification() {
        assert!(PipelineError::InsufficientData { samples: 10, window: 1280 }.is_client_error());
        assert!(!PipelineError::SchemaMismatch { expected: 1, actual: 2 }.is_client_error());
        assert_eq!(
            PipelineError::SchemaMismatch { expected: 1, actual: 2 }.code(),
            "SCHEMA_MISMATCH"
        );
    }

    #[test]
    fn test_staging_failure_is_server_side() {
        let err = PipelineError::Staging("disk full".into());
        assert!(!err.is_client_error());
        assert!(err.is_required_path());
        assert_eq!(err.code(), "STAGING_ERROR");
        assert!(!PipelineError::Internal("cancelled".into()).is_client_error());
    }
}

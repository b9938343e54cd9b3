//! diagnos-eeg: EEG screening service
//!
//! Turns one uploaded EDF recording into a screening report.
//!
//! ## Architecture
//!
//! - **Acquisition**: EDF container decoding into a [`Recording`]
//! - **Processing**: average reference, zero-phase band-pass, epoch segmentation
//! - **ML Engine**: 13 statistics per channel per epoch, linear classifier
//! - **Artifacts**: raw-signal PNG rendering and blob storage (optional)
//! - **Narrative**: generative-text overview of the result (optional)
//! - **Pipeline**: per-request orchestration and upload staging
//! - **API**: thin axum surface over the pipeline

pub mod acquisition;
pub mod api;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod ml_engine;
pub mod narrative;
pub mod pipeline;
pub mod processing;
pub mod types;

// Re-export configuration
pub use config::ServiceConfig;

// Re-export the error taxonomy
pub use error::PipelineError;

// Re-export commonly used types
pub use types::{
    Aggregation, Artifact, ClassificationResult, ConditionInfo, Epoch, RawScore, Recording, Report,
    Verdict,
};

// Re-export pipeline entry points
pub use ml_engine::{Classifier, FeatureExtractor, FeatureLayout, FeatureMatrix, ModelFile};
pub use pipeline::{Orchestrator, RequiredStages, StagedUpload, StagingArea};

//! Screening Pipeline
//!
//! ```text
//! upload -> staging -> EDF decode -> preprocess -> epochs -> features
//!        -> classifier -> aggregation -> (label, confidence)
//!        -> [render -> blob store -> narrative] -> Report
//! ```
//!
//! Bracketed stages are optional and never fail the request.

mod orchestrator;
mod staging;

pub use orchestrator::{Orchestrator, RequiredStages, Screening, Stage};
pub use staging::{StagedUpload, StagingArea};

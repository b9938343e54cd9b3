//! Shared data structures for the screening pipeline
//!
//! - `Recording` / `Epoch`: decoded signal and fixed-length windows over it
//! - `ClassificationResult` / `Verdict`: per-epoch and per-recording model output
//! - `Artifact` / `Report`: optional rendered signal and the final response

mod recording;
mod classification;
mod report;

pub use recording::*;
pub use classification::*;
pub use report::*;

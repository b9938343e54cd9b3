//! Signal processing module - preprocessing and epoch segmentation

mod epochs;
mod filters;

pub use epochs::{segment, segment_with, EpochWindow, Epochs};
pub use filters::{average_reference, filtfilt, Biquad, BiquadCoeffs, Preprocessor};

//! ML Engine for EEG screening
//!
//! Turns epochs into feature vectors and feature vectors into labels.
//!
//! ## Architecture
//! - `features`: the ordered 13-statistic table, feature layouts and the
//!   parallel feature-matrix builder (rayon)
//! - `classifier`: JSON linear model (margin or logistic) with optional
//!   standard scaler and a declared feature contract

pub mod classifier;
pub mod features;

pub use classifier::{Classifier, FeatureContract, ModelFile, ModelKind, ModelSummary, Scaler};
pub use features::{channel_statistics, FeatureExtractor, FeatureLayout, FeatureMatrix, Statistic, STAT_COUNT};

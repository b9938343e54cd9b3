//! Pretrained linear classifier adapter
//!
//! The model is a JSON file exported from the training environment:
//!
//! ```json
//! {
//!   "version": 1,
//!   "kind": "linear_margin",
//!   "labels": ["Healthy", "Schizophrenia"],
//!   "input_dim": 247,
//!   "weights": [[...247 values...]],
//!   "intercepts": [0.12],
//!   "scaler": { "mean": [...], "scale": [...] },
//!   "margin_scale": 1.0,
//!   "contract": { "channels": 19, "window_secs": 5.0, "overlap_secs": 1.0,
//!                 "layout": "statistic_major" }
//! }
//! ```
//!
//! Binary models carry one weight row (positive margin favours `labels[1]`);
//! multiclass models carry one row per label, scored one-vs-rest.
//! The classifier never reshapes input: a row whose width differs from
//! `input_dim` is a [`PipelineError::SchemaMismatch`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::Path;
use tracing::info;

use super::features::{FeatureLayout, FeatureMatrix, STAT_COUNT};
use crate::config::defaults;
use crate::error::PipelineError;
use crate::types::{ClassificationResult, RawScore};

/// Model file format understood by this build.
pub const MODEL_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Persisted model
// ============================================================================

/// How the linear score becomes a decision and a confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// SVM / LDA style decision function; confidence from the margin
    LinearMargin,
    /// Logistic regression; confidence from the class probability
    Logistic,
}

/// Standardisation applied before the dot product: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Input expectations the model was trained under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContract {
    /// Channel count seen in training; `input_dim == 13 * channels` when set
    #[serde(default)]
    pub channels: Option<usize>,
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,
    #[serde(default = "default_overlap_secs")]
    pub overlap_secs: f64,
    #[serde(default)]
    pub layout: FeatureLayout,
}

fn default_window_secs() -> f64 {
    defaults::WINDOW_SECS
}
fn default_overlap_secs() -> f64 {
    defaults::OVERLAP_SECS
}
fn default_margin_scale() -> f64 {
    defaults::MARGIN_SCALE
}

impl Default for FeatureContract {
    fn default() -> Self {
        Self {
            channels: None,
            window_secs: default_window_secs(),
            overlap_secs: default_overlap_secs(),
            layout: FeatureLayout::default(),
        }
    }
}

/// On-disk model representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub version: u32,
    pub kind: ModelKind,
    pub labels: Vec<String>,
    pub input_dim: usize,
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<Scaler>,
    #[serde(default = "default_margin_scale")]
    pub margin_scale: f64,
    #[serde(default)]
    pub contract: FeatureContract,
}

impl ModelFile {
    /// Save to disk atomically (write temp file, then rename).
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Check every structural invariant; returns the first violation.
    fn check(&self) -> Result<(), String> {
        if self.version != MODEL_FORMAT_VERSION {
            return Err(format!(
                "unsupported model format version {} (expected {MODEL_FORMAT_VERSION})",
                self.version
            ));
        }
        if self.labels.len() < 2 {
            return Err(format!("need at least 2 labels, got {}", self.labels.len()));
        }
        let unique: HashSet<&String> = self.labels.iter().collect();
        if unique.len() != self.labels.len() {
            return Err("labels must be unique".to_string());
        }
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }

        let expected_rows = if self.labels.len() == 2 { 1 } else { self.labels.len() };
        if self.weights.len() != expected_rows {
            return Err(format!(
                "{} labels need {expected_rows} weight rows, got {}",
                self.labels.len(),
                self.weights.len()
            ));
        }
        if let Some((i, row)) = self
            .weights
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != self.input_dim)
        {
            return Err(format!(
                "weight row {i} has {} values, input_dim is {}",
                row.len(),
                self.input_dim
            ));
        }
        if self.intercepts.len() != expected_rows {
            return Err(format!(
                "expected {expected_rows} intercepts, got {}",
                self.intercepts.len()
            ));
        }
        let all_finite = self
            .weights
            .iter()
            .flatten()
            .chain(self.intercepts.iter())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err("weights and intercepts must be finite".to_string());
        }

        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != self.input_dim || scaler.scale.len() != self.input_dim {
                return Err(format!(
                    "scaler has {}/{} values, input_dim is {}",
                    scaler.mean.len(),
                    scaler.scale.len(),
                    self.input_dim
                ));
            }
            if scaler.scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
                return Err("scaler.scale values must be finite and non-zero".to_string());
            }
            if scaler.mean.iter().any(|m| !m.is_finite()) {
                return Err("scaler.mean values must be finite".to_string());
            }
        }

        if !self.margin_scale.is_finite() || self.margin_scale <= 0.0 {
            return Err(format!("margin_scale must be > 0, got {}", self.margin_scale));
        }

        let c = &self.contract;
        if let Some(channels) = c.channels {
            if channels * STAT_COUNT != self.input_dim {
                return Err(format!(
                    "contract declares {channels} channels ({} features) but input_dim is {}",
                    channels * STAT_COUNT,
                    self.input_dim
                ));
            }
        }
        if !(c.window_secs.is_finite() && c.window_secs > 0.0) {
            return Err(format!("contract.window_secs must be > 0, got {}", c.window_secs));
        }
        if !(c.overlap_secs.is_finite() && c.overlap_secs >= 0.0 && c.overlap_secs < c.window_secs) {
            return Err(format!(
                "contract.overlap_secs must be in [0, window_secs), got {}",
                c.overlap_secs
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Read-only model handle, shared across requests behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Classifier {
    model: ModelFile,
}

/// Public description of the loaded model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub kind: ModelKind,
    pub labels: Vec<String>,
    pub input_dim: usize,
    pub channels: Option<usize>,
    pub window_secs: f64,
    pub overlap_secs: f64,
    pub layout: FeatureLayout,
    pub scaled: bool,
}

impl Classifier {
    /// Load and validate a model file. Any failure is fatal to startup.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let unavailable = |reason: String| PipelineError::ModelUnavailable {
            path: path.display().to_string(),
            reason,
        };
        let bytes = std::fs::read(path).map_err(|e| unavailable(e.to_string()))?;
        let model: ModelFile =
            serde_json::from_slice(&bytes).map_err(|e| unavailable(format!("invalid model JSON: {e}")))?;
        model.check().map_err(unavailable)?;

        info!(
            path = %path.display(),
            kind = ?model.kind,
            labels = ?model.labels,
            input_dim = model.input_dim,
            "Classifier loaded"
        );
        Ok(Self { model })
    }

    /// Wrap an in-memory model, applying the same checks as [`Classifier::load`].
    pub fn from_model(model: ModelFile) -> Result<Self, PipelineError> {
        model.check().map_err(|reason| PipelineError::ModelUnavailable {
            path: "<memory>".to_string(),
            reason,
        })?;
        Ok(Self { model })
    }

    pub fn input_dim(&self) -> usize {
        self.model.input_dim
    }

    pub fn labels(&self) -> &[String] {
        &self.model.labels
    }

    pub fn kind(&self) -> ModelKind {
        self.model.kind
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.model.contract
    }

    pub fn summary(&self) -> ModelSummary {
        let c = &self.model.contract;
        ModelSummary {
            kind: self.model.kind,
            labels: self.model.labels.clone(),
            input_dim: self.model.input_dim,
            channels: c.channels,
            window_secs: c.window_secs,
            overlap_secs: c.overlap_secs,
            layout: c.layout,
            scaled: self.model.scaler.is_some(),
        }
    }

    /// Classify every row. Fails on the first row with the wrong width.
    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<ClassificationResult>, PipelineError> {
        if !features.is_empty() && features.cols() != self.model.input_dim {
            return Err(PipelineError::SchemaMismatch {
                expected: self.model.input_dim,
                actual: features.cols(),
            });
        }
        features.iter_rows().map(|row| self.predict_row(row)).collect()
    }

    /// Classify a single feature vector.
    pub fn predict_row(&self, row: &[f64]) -> Result<ClassificationResult, PipelineError> {
        if row.len() != self.model.input_dim {
            return Err(PipelineError::SchemaMismatch {
                expected: self.model.input_dim,
                actual: row.len(),
            });
        }

        let scores = self.decision_function(row);
        let (class_index, score, confidence) = match (self.model.kind, scores.as_slice()) {
            (ModelKind::LinearMargin, [m]) => {
                let idx = usize::from(*m > 0.0);
                (idx, RawScore::Margin(*m), self.margin_confidence(m.abs()))
            }
            (ModelKind::LinearMargin, many) => {
                let (idx, top1, top2) = top_two(many);
                (idx, RawScore::Margin(top1), self.margin_confidence(top1 - top2))
            }
            (ModelKind::Logistic, [m]) => {
                let p1 = sigmoid(*m);
                let idx = usize::from(p1 > 0.5);
                let p = if idx == 1 { p1 } else { 1.0 - p1 };
                (idx, RawScore::Probability(p), 100.0 * p)
            }
            (ModelKind::Logistic, many) => {
                let probs = softmax(many);
                let (idx, p, _) = top_two(&probs);
                (idx, RawScore::Probability(p), 100.0 * p)
            }
        };

        Ok(ClassificationResult {
            label: self.model.labels[class_index].clone(),
            class_index,
            score,
            confidence: confidence.clamp(0.0, 100.0),
        })
    }

    /// Linear scores, one per weight row.
    fn decision_function(&self, row: &[f64]) -> Vec<f64> {
        let scaled: Vec<f64> = match &self.model.scaler {
            Some(s) => row
                .iter()
                .zip(s.mean.iter().zip(&s.scale))
                .map(|(x, (m, sc))| (x - m) / sc)
                .collect(),
            None => row.to_vec(),
        };
        self.model
            .weights
            .iter()
            .zip(&self.model.intercepts)
            .map(|(w, b)| w.iter().zip(&scaled).map(|(wi, xi)| wi * xi).sum::<f64>() + b)
            .collect()
    }

    fn margin_confidence(&self, gap: f64) -> f64 {
        100.0 * (gap / self.model.margin_scale).tanh()
    }
}

/// Index and value of the best score plus the runner-up value. Ties keep the lowest index.
fn top_two(values: &[f64]) -> (usize, f64, f64) {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    let second = values
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != best)
        .map(|(_, v)| *v)
        .fold(f64::NEG_INFINITY, f64::max);
    (best, values[best], second)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

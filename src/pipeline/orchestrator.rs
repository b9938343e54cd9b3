//! Screening Orchestrator - per-request state machine
//!
//! ```text
//! Received -> Segmenting -> FeatureExtracting -> Classifying
//!     -> ClassifiedFailed                       (typed error, request aborts)
//!     -> ClassifiedOk -> Rendering -> NarrativeGenerating -> Completed
//! ```
//!
//! Received through Classifying are the required path and run on the
//! blocking pool. Rendering and NarrativeGenerating are optional: they log
//! and swallow their own failures, leaving `link` / `overview` unset.
//! The narrative needs an artifact URL and is skipped without one.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument, Span};

use super::staging::StagedUpload;
use crate::acquisition::decode_edf;
use crate::artifacts::{store_artifact, store_from_config, BlobStore, SignalRenderer, PNG_CONTENT_TYPE};
use crate::config::ServiceConfig;
use crate::error::PipelineError;
use crate::knowledge::ConditionCatalog;
use crate::ml_engine::{Classifier, FeatureExtractor, STAT_COUNT};
use crate::narrative::{Narrator, PromptContext};
use crate::processing::{segment_with, EpochWindow, Preprocessor};
use crate::types::{Aggregation, Artifact, Recording, Report, Verdict};

/// Request lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Segmenting,
    FeatureExtracting,
    Classifying,
    ClassifiedOk,
    ClassifiedFailed,
    Rendering,
    NarrativeGenerating,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Segmenting => "segmenting",
            Stage::FeatureExtracting => "feature_extracting",
            Stage::Classifying => "classifying",
            Stage::ClassifiedOk => "classified_ok",
            Stage::ClassifiedFailed => "classified_failed",
            Stage::Rendering => "rendering",
            Stage::NarrativeGenerating => "narrative_generating",
            Stage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the required path.
#[derive(Debug, Clone)]
pub struct Screening {
    /// Decoded, unfiltered recording (the renderer draws this)
    pub recording: Recording,
    pub verdict: Verdict,
    pub epochs: usize,
}

// ============================================================================
// Required path
// ============================================================================

/// Decode, preprocess, segment, extract and classify. Synchronous and
/// CPU-bound; the orchestrator runs it on the blocking pool.
#[derive(Debug, Clone)]
pub struct RequiredStages {
    classifier: Arc<Classifier>,
    preprocessor: Preprocessor,
    aggregation: Aggregation,
}

impl RequiredStages {
    pub fn new(classifier: Arc<Classifier>, preprocessor: Preprocessor, aggregation: Aggregation) -> Self {
        Self {
            classifier,
            preprocessor,
            aggregation,
        }
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    /// Run every required stage on raw EDF bytes.
    pub fn screen(&self, bytes: &[u8]) -> Result<Screening, PipelineError> {
        debug!(stage = %Stage::Received, bytes = bytes.len(), "Stage");
        let recording = decode_edf(bytes)?;
        self.screen_recording(recording)
    }

    /// Required stages after decoding.
    pub fn screen_recording(&self, recording: Recording) -> Result<Screening, PipelineError> {
        debug!(stage = %Stage::Segmenting, "Stage");
        let contract = self.classifier.contract();
        if let Some(expected) = contract.channels {
            if expected != recording.channel_count() {
                return Err(PipelineError::SchemaMismatch {
                    expected: STAT_COUNT * expected,
                    actual: STAT_COUNT * recording.channel_count(),
                });
            }
        }

        let filtered = self.preprocessor.apply(&recording)?;
        let geometry = EpochWindow::from_secs(filtered.sample_rate(), contract.window_secs, contract.overlap_secs)?;
        let epochs = segment_with(&filtered, geometry);
        if epochs.len() == 0 {
            return Err(PipelineError::InsufficientData {
                samples: filtered.len(),
                window: geometry.window(),
            });
        }
        let n_epochs = epochs.len();
        debug!(epochs = n_epochs, window = geometry.window(), overlap = geometry.overlap(), "Recording segmented");

        debug!(stage = %Stage::FeatureExtracting, "Stage");
        let features = FeatureExtractor::new(contract.layout).extract_all(epochs);

        debug!(stage = %Stage::Classifying, rows = features.rows(), cols = features.cols(), "Stage");
        let results = self.classifier.predict(&features)?;
        let verdict = self.aggregation.aggregate(&results).ok_or(PipelineError::InsufficientData {
            samples: filtered.len(),
            window: geometry.window(),
        })?;

        Ok(Screening {
            recording,
            verdict,
            epochs: n_epochs,
        })
    }
}

async fn on_blocking_pool<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    let span = Span::current();
    match tokio::task::spawn_blocking(move || span.in_scope(f)).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(PipelineError::Internal(format!("processing was cancelled: {e}"))),
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Optional artifact stage wiring.
#[derive(Clone)]
struct ArtifactStage {
    renderer: SignalRenderer,
    store: Arc<dyn BlobStore>,
    timeout: Duration,
}

/// Runs one screening request end to end. Shared across requests.
#[derive(Clone)]
pub struct Orchestrator {
    required: RequiredStages,
    artifacts: Option<ArtifactStage>,
    narrator: Option<Narrator>,
    conditions: Arc<ConditionCatalog>,
}

impl Orchestrator {
    /// Required path only; add optional stages with the `with_*` builders.
    pub fn new(required: RequiredStages, conditions: ConditionCatalog) -> Self {
        Self {
            required,
            artifacts: None,
            narrator: None,
            conditions: Arc::new(conditions),
        }
    }

    /// Wire every stage from configuration.
    pub fn from_config(
        classifier: Arc<Classifier>,
        config: &ServiceConfig,
        conditions: ConditionCatalog,
    ) -> Result<Self, PipelineError> {
        let required = RequiredStages::new(
            classifier,
            Preprocessor::new(config.preprocessing.clone()),
            config.classifier.aggregation,
        );
        let mut orchestrator = Self::new(required, conditions);

        if let Some(store) = store_from_config(&config.artifacts)? {
            info!(backend = store.name(), "Artifact storage enabled");
            orchestrator = orchestrator.with_artifacts(
                SignalRenderer::from_config(&config.artifacts),
                store,
                Duration::from_secs(config.artifacts.timeout_secs),
            );
        }
        if let Some(narrator) = Narrator::from_config(&config.narrative) {
            info!(model = %config.narrative.model, "Narrative generation enabled");
            orchestrator = orchestrator.with_narrator(narrator);
        }
        Ok(orchestrator)
    }

    pub fn with_artifacts(mut self, renderer: SignalRenderer, store: Arc<dyn BlobStore>, timeout: Duration) -> Self {
        self.artifacts = Some(ArtifactStage {
            renderer,
            store,
            timeout,
        });
        self
    }

    pub fn with_narrator(mut self, narrator: Narrator) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        self.required.classifier()
    }

    pub fn required(&self) -> &RequiredStages {
        &self.required
    }

    /// Screen a staged upload. The staged file is removed when this returns
    /// (or unwinds), because `upload` is dropped with the request.
    pub async fn run(&self, upload: StagedUpload) -> Result<Report, PipelineError> {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("screening", request_id = %request_id, file = %upload.original_name());

        async move {
            let started = Instant::now();
            info!(stage = %Stage::Received, path = %upload.path().display(), "Stage");
            let bytes = upload.read()?;
            let report = self.screen_bytes(bytes).await;
            match &report {
                Ok(r) => info!(
                    stage = %Stage::Completed,
                    prediction = %r.prediction,
                    confidence = r.confidence,
                    link = r.link.is_some(),
                    overview = r.overview.is_some(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Stage"
                ),
                Err(e) => warn!(code = e.code(), error = %e, "Screening aborted"),
            }
            drop(upload);
            report
        }
        .instrument(span)
        .await
    }

    /// Screen raw EDF bytes (used by `run` and by the CLI).
    pub async fn screen_bytes(&self, bytes: Vec<u8>) -> Result<Report, PipelineError> {
        let required = self.required.clone();
        let screening = match on_blocking_pool(move || required.screen(&bytes)).await {
            Ok(s) => s,
            Err(e) => {
                warn!(stage = %Stage::ClassifiedFailed, code = e.code(), error = %e, "Stage");
                return Err(e);
            }
        };
        let verdict = &screening.verdict;
        info!(
            stage = %Stage::ClassifiedOk,
            label = %verdict.label,
            confidence = verdict.confidence,
            supporting = verdict.supporting_epochs,
            epochs = screening.epochs,
            "Stage"
        );

        let artifact = self.render_and_store(&screening.recording).await;
        let overview = match &artifact {
            Some(artifact) => self.narrate(artifact, &screening).await,
            None => None,
        };

        let info = self.conditions.lookup(&verdict.label);
        let link = artifact.map(|a| a.url);
        Ok(Report::new(verdict.label.clone(), verdict.confidence, link, overview, info))
    }

    async fn render_and_store(&self, recording: &Recording) -> Option<Artifact> {
        let stage = self.artifacts.as_ref()?;
        debug!(stage = %Stage::Rendering, backend = stage.store.name(), "Stage");

        let renderer = stage.renderer.clone();
        let raw = recording.clone();
        let png = match on_blocking_pool(move || renderer.render(&raw)).await {
            Ok(png) => png,
            Err(e) => {
                warn!(error = %e, "Artifact rendering failed, continuing without link");
                return None;
            }
        };

        match store_artifact(stage.store.as_ref(), png, PNG_CONTENT_TYPE, stage.timeout).await {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                warn!(backend = stage.store.name(), error = %e, "Artifact upload failed, continuing without link");
                None
            }
        }
    }

    async fn narrate(&self, artifact: &Artifact, screening: &Screening) -> Option<String> {
        let narrator = self.narrator.as_ref()?;
        debug!(stage = %Stage::NarrativeGenerating, "Stage");
        let ctx = PromptContext {
            prediction: screening.verdict.label.clone(),
            confidence: screening.verdict.confidence,
            channels: screening.recording.channel_count(),
            duration_secs: screening.recording.duration_secs(),
        };
        narrator.summarize(artifact, &ctx).await
    }
}

//! Narrative generation
//!
//! Asks an external generative-text service for a plain-language overview
//! of the classification and the rendered signal plot. The narrative is an
//! optional report field: every failure degrades to `None`.

mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::NarrativeConfig;
use crate::error::PipelineError;
use crate::types::Artifact;

/// Generative text backend.
#[async_trait]
pub trait NarrativeService: Send + Sync {
    /// Produce text for `prompt`, with the rendered plot attached.
    async fn generate(&self, prompt: &str, image: &Artifact) -> Result<String, PipelineError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Values substituted into the prompt template.
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub prediction: String,
    pub confidence: f64,
    pub channels: usize,
    pub duration_secs: f64,
}

/// Fill `{prediction}`, `{confidence}`, `{channels}`, `{duration_secs}` and
/// `{artifact_url}` in `template`. Unknown placeholders are left as-is.
pub fn render_prompt(template: &str, ctx: &PromptContext, artifact_url: &str) -> String {
    template
        .replace("{prediction}", &ctx.prediction)
        .replace("{confidence}", &format!("{:.1}", ctx.confidence))
        .replace("{channels}", &ctx.channels.to_string())
        .replace("{duration_secs}", &format!("{:.0}", ctx.duration_secs))
        .replace("{artifact_url}", artifact_url)
}

fn emphasis_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // **bold**, __bold__, *italic*, _italic_, `code`
    RE.get_or_init(|| {
        Regex::new(r"\*\*(.+?)\*\*|__(.+?)__|\*(\S(?:.*?\S)?)\*|\b_(\S(?:.*?\S)?)_\b|`([^`]+)`").ok()
    })
    .as_ref()
}

fn line_marker_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // headings, bullets and numbered list markers at line start
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:#{1,6}\s+|[-*+]\s+|\d+[.)]\s+)").ok())
        .as_ref()
}

/// Strip markdown emphasis and list/heading markers, collapse to one paragraph.
pub fn strip_markdown(text: &str) -> String {
    let mut plain = text.to_string();
    if let Some(re) = line_marker_re() {
        plain = re.replace_all(&plain, "").into_owned();
    }
    if let Some(re) = emphasis_re() {
        plain = re
            .replace_all(&plain, |caps: &regex::Captures<'_>| {
                (1..=5)
                    .find_map(|i| caps.get(i))
                    .map_or(String::new(), |m| m.as_str().to_string())
            })
            .into_owned();
    }
    plain.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Bounded, retrying front end to a [`NarrativeService`].
#[derive(Clone)]
pub struct Narrator {
    service: Arc<dyn NarrativeService>,
    template: String,
    timeout: Duration,
    max_retries: u32,
}

impl Narrator {
    pub fn new(service: Arc<dyn NarrativeService>, template: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            service,
            template: template.into(),
            timeout,
            max_retries,
        }
    }

    /// Build the configured narrator; `None` when disabled or unconfigured.
    pub fn from_config(config: &NarrativeConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let client = GeminiClient::from_config(config)?;
        Some(Self::new(
            Arc::new(client),
            config.prompt_template.clone(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        ))
    }

    /// Generate a cleaned narrative, or `None` after all attempts fail.
    pub async fn summarize(&self, artifact: &Artifact, ctx: &PromptContext) -> Option<String> {
        let prompt = render_prompt(&self.template, ctx, &artifact.url);
        let attempts = self.max_retries + 1;

        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(self.timeout, self.service.generate(&prompt, artifact))
                .await
                .unwrap_or_else(|_| {
                    Err(PipelineError::NarrativeUnavailable(format!(
                        "no reply within {:?}",
                        self.timeout
                    )))
                });

            match outcome {
                Ok(text) => {
                    let cleaned = strip_markdown(&text);
                    if !cleaned.is_empty() {
                        debug!(backend = self.service.name(), attempt, chars = cleaned.len(), "Narrative generated");
                        return Some(cleaned);
                    }
                    warn!(backend = self.service.name(), attempt, "Narrative reply was empty");
                }
                Err(e) => {
                    warn!(backend = self.service.name(), attempt, attempts, error = %e, "Narrative attempt failed");
                }
            }
        }
        None
    }
}

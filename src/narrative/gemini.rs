//! Gemini-compatible `generateContent` client

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use super::NarrativeService;
use crate::config::NarrativeConfig;
use crate::error::PipelineError;
use crate::types::Artifact;

/// HTTP client for `POST {endpoint}/models/{model}:generateContent`.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(endpoint: &str, model: &str, api_key: &str) -> Result<Self, PipelineError> {
        // Per-attempt deadlines are applied by the caller; this is a backstop
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PipelineError::NarrativeUnavailable(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build from config, reading the key from `config.api_key_env`.
    ///
    /// Returns `None` (narratives disabled) when the key is absent.
    pub fn from_config(config: &NarrativeConfig) -> Option<Self> {
        let key = match std::env::var(&config.api_key_env) {
            Ok(k) if !k.trim().is_empty() => k,
            _ => {
                warn!(env = %config.api_key_env, "Narrative API key not set, narratives disabled");
                return None;
            }
        };
        match Self::new(&config.endpoint, &config.model, &key) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "Failed to build narrative client, narratives disabled");
                None
            }
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

/// `generateContent` body: the prompt followed by the image inlined as base64.
fn request_body(prompt: &str, image: &Artifact) -> serde_json::Value {
    json!({
        "contents": [{
            "parts": [
                { "text": prompt },
                {
                    "inline_data": {
                        "mime_type": image.content_type,
                        "data": base64::engine::general_purpose::STANDARD.encode(&image.bytes)
                    }
                }
            ]
        }]
    })
}

#[async_trait]
impl NarrativeService for GeminiClient {
    async fn generate(&self, prompt: &str, image: &Artifact) -> Result<String, PipelineError> {
        let body = request_body(prompt, image);

        let resp = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::NarrativeUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::NarrativeUnavailable(format!(
                "service returned status {status}"
            )));
        }

        let reply: GenerateReply = resp
            .json()
            .await
            .map_err(|e| PipelineError::NarrativeUnavailable(format!("unreadable reply: {e}")))?;

        let text: String = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(PipelineError::NarrativeUnavailable("reply carries no text".to_string()));
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

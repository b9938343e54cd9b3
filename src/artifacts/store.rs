//! Blob storage for rendered artifacts
//!
//! A [`BlobStore`] takes bytes plus a content type under a caller-chosen key
//! and returns a URL that resolves to them. Keys are UUID v4 based, so
//! concurrent requests never collide.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{ArtifactConfig, BlobBackend};
use crate::error::PipelineError;
use crate::types::Artifact;

/// Blob store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned status {0}")]
    ServerError(reqwest::StatusCode),
    #[error("Upload reply carries no URL")]
    MissingUrl,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload timed out after {0:?}")]
    Timeout(Duration),
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        PipelineError::StorageUnavailable(e.to_string())
    }
}

/// Destination for rendered artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return a resolvable URL.
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, StoreError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Fresh storage key, e.g. `3f2b...-....png`.
pub fn new_key(extension: &str) -> String {
    format!("{}.{extension}", uuid::Uuid::new_v4())
}

/// Upload `bytes` under a fresh key, bounded by `timeout`.
pub async fn store_artifact(
    store: &dyn BlobStore,
    bytes: Vec<u8>,
    content_type: &'static str,
    timeout: Duration,
) -> Result<Artifact, PipelineError> {
    let extension = content_type.rsplit('/').next().unwrap_or("bin");
    let key = new_key(extension);
    let url = tokio::time::timeout(timeout, store.upload(&key, &bytes, content_type))
        .await
        .map_err(|_| StoreError::Timeout(timeout))??;

    debug!(backend = store.name(), key = %key, url = %url, "Artifact stored");
    Ok(Artifact {
        bytes,
        content_type,
        key,
        url,
    })
}

/// Build the configured backend. `None` means artifacts are disabled.
pub fn store_from_config(config: &ArtifactConfig) -> Result<Option<Arc<dyn BlobStore>>, PipelineError> {
    match config.backend {
        BlobBackend::None => Ok(None),
        BlobBackend::Local => Ok(Some(Arc::new(LocalBlobStore::new(
            &config.local_dir,
            &config.public_base_url,
        )))),
        BlobBackend::Http => {
            let endpoint = config.http_endpoint.clone().ok_or_else(|| {
                PipelineError::StorageUnavailable("artifacts.http_endpoint is not set".to_string())
            })?;
            let store = HttpBlobStore::new(
                &endpoint,
                config.http_upload_preset.clone(),
                Duration::from_secs(config.timeout_secs),
            )?;
            Ok(Some(Arc::new(store)))
        }
    }
}

// ============================================================================
// Local directory
// ============================================================================

/// Writes artifacts to a directory served by this process.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String, StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(key), bytes).await?;
        Ok(format!("{}/{}", self.public_base_url, key))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

// ============================================================================
// HTTP media host
// ============================================================================

/// Multipart upload to a media host that answers with `secure_url` / `url`.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    http: reqwest::Client,
    endpoint: String,
    upload_preset: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct UploadReply {
    secure_url: Option<String>,
    url: Option<String>,
}

impl HttpBlobStore {
    pub fn new(endpoint: &str, upload_preset: Option<String>, timeout: Duration) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            upload_preset,
        })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, StoreError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(key.to_string())
            .mime_str(content_type)?;
        let public_id = key.rsplit_once('.').map_or(key, |(stem, _)| stem).to_string();
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("public_id", public_id);
        if let Some(preset) = &self.upload_preset {
            form = form.text("upload_preset", preset.clone());
        }

        let resp = self.http.post(&self.endpoint).multipart(form).send().await?;
        if !resp.status().is_success() {
            return Err(StoreError::ServerError(resp.status()));
        }
        let reply: UploadReply = resp.json().await?;
        reply.secure_url.or(reply.url).ok_or(StoreError::MissingUrl)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

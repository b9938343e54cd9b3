//! Service Configuration - every tunable of the screening service as TOML
//!
//! Each section implements `Default` with the values in [`super::defaults`],
//! so the service runs unchanged when no config file is present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::types::Aggregation;

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "DIAGNOS_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "diagnos.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one service deployment.
///
/// Load with `ServiceConfig::load()` which searches:
/// 1. `$DIAGNOS_CONFIG` env var
/// 2. `./diagnos.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP server and admission control
    #[serde(default)]
    pub server: ServerConfig,

    /// Classifier model location
    #[serde(default)]
    pub model: ModelConfig,

    /// Re-referencing and band-pass filtering
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,

    /// Per-epoch result aggregation
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Signal plot rendering and blob storage
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Generative narrative service
    #[serde(default)]
    pub narrative: NarrativeConfig,

    /// Per-label condition texts
    #[serde(default)]
    pub conditions: ConditionsConfig,
}

impl ServiceConfig {
    /// Load configuration using the standard search order:
    /// 1. `$DIAGNOS_CONFIG` environment variable
    /// 2. `./diagnos.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// Environment overrides (`DIAGNOS_SERVER_ADDR`, `DIAGNOS_MODEL_PATH`)
    /// are applied on top of whichever source was used.
    pub fn load() -> Self {
        let mut config = Self::load_file_or_default();
        config.apply_env_overrides();
        config
    }

    fn load_file_or_default() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded service config from DIAGNOS_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from DIAGNOS_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "DIAGNOS_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./diagnos.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded service config from ./diagnos.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./diagnos.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No diagnos.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DIAGNOS_SERVER_ADDR` / `DIAGNOS_MODEL_PATH` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("DIAGNOS_SERVER_ADDR") {
            if !addr.trim().is_empty() {
                self.server.addr = addr;
            }
        }
        if let Ok(path) = std::env::var("DIAGNOS_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = path;
            }
        }
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all sections for internal consistency.
    ///
    /// Every rule is checked; the error lists all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let s = &self.server;
        if s.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("server.addr '{}' is not a socket address", s.addr));
        }
        if s.max_concurrent_requests == 0 {
            errors.push("server.max_concurrent_requests must be > 0".to_string());
        }
        if s.max_upload_mb == 0 {
            errors.push("server.max_upload_mb must be > 0".to_string());
        }

        if self.model.path.trim().is_empty() {
            errors.push("model.path must not be empty".to_string());
        }

        let p = &self.preprocessing;
        Self::check_positive(p.highpass_hz, "preprocessing.highpass_hz", &mut errors);
        Self::check_positive(p.lowpass_hz, "preprocessing.lowpass_hz", &mut errors);
        if p.highpass_hz.is_finite() && p.lowpass_hz.is_finite() && p.lowpass_hz <= p.highpass_hz {
            errors.push(format!(
                "preprocessing.lowpass_hz ({}) must be > highpass_hz ({})",
                p.lowpass_hz, p.highpass_hz
            ));
        }

        let a = &self.artifacts;
        if a.timeout_secs == 0 {
            errors.push("artifacts.timeout_secs must be > 0".to_string());
        }
        Self::check_positive(a.max_seconds, "artifacts.max_seconds", &mut errors);
        if a.width < 100 || a.height < 100 {
            errors.push(format!(
                "artifacts.width x height ({} x {}) must both be >= 100",
                a.width, a.height
            ));
        }
        if a.backend == BlobBackend::Http && a.http_endpoint.as_deref().map_or(true, str::is_empty) {
            errors.push("artifacts.http_endpoint is required when backend = \"http\"".to_string());
        }

        let n = &self.narrative;
        if n.timeout_secs == 0 {
            errors.push("narrative.timeout_secs must be > 0".to_string());
        }
        if n.enabled && n.model.trim().is_empty() {
            errors.push("narrative.model must not be empty when narrative is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass, so test finiteness first
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} must be a finite number > 0 (got {value})"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by `DIAGNOS_SERVER_ADDR` env var or `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,

    /// Screening requests processed at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Wait for an admission permit before answering 503
    #[serde(default = "default_admission_timeout")]
    pub admission_timeout_secs: u64,

    /// Upload body limit in MiB
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// Directory for staged uploads (system temp dir when unset)
    #[serde(default)]
    pub staging_dir: Option<String>,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}
fn default_max_concurrent() -> usize {
    defaults::MAX_CONCURRENT_REQUESTS
}
fn default_admission_timeout() -> u64 {
    defaults::ADMISSION_TIMEOUT_SECS
}
fn default_max_upload_mb() -> usize {
    defaults::MAX_UPLOAD_MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            max_concurrent_requests: default_max_concurrent(),
            admission_timeout_secs: default_admission_timeout(),
            max_upload_mb: default_max_upload_mb(),
            staging_dir: None,
        }
    }
}

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the JSON classifier file.
    ///
    /// Can be overridden by `DIAGNOS_MODEL_PATH` env var or `--model` CLI flag.
    #[serde(default = "default_model_path")]
    pub path: String,
}

fn default_model_path() -> String {
    defaults::MODEL_PATH.to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
        }
    }
}

// ============================================================================
// Preprocessing
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Master switch; when off the classifier sees the raw recording
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Subtract the per-sample channel mean
    #[serde(default = "default_true")]
    pub average_reference: bool,

    #[serde(default = "default_highpass")]
    pub highpass_hz: f64,

    #[serde(default = "default_lowpass")]
    pub lowpass_hz: f64,
}

fn default_true() -> bool {
    true
}
fn default_highpass() -> f64 {
    defaults::HIGHPASS_HZ
}
fn default_lowpass() -> f64 {
    defaults::LOWPASS_HZ
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            average_reference: true,
            highpass_hz: default_highpass(),
            lowpass_hz: default_lowpass(),
        }
    }
}

// ============================================================================
// Classifier
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// `majority_vote` or `first_epoch`
    #[serde(default)]
    pub aggregation: Aggregation,
}

// ============================================================================
// Artifacts
// ============================================================================

/// Blob store backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobBackend {
    /// Files under `local_dir`, served by this process at `/artifacts`
    #[default]
    Local,
    /// Multipart upload to an external media host
    Http,
    /// Rendering and narrative are skipped
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default)]
    pub backend: BlobBackend,

    #[serde(default = "default_artifact_dir")]
    pub local_dir: String,

    /// Prefix for URLs handed out by the local backend
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Upload endpoint for the http backend
    #[serde(default)]
    pub http_endpoint: Option<String>,

    /// Unsigned upload preset sent with http uploads
    #[serde(default)]
    pub http_upload_preset: Option<String>,

    #[serde(default = "default_blob_timeout")]
    pub timeout_secs: u64,

    /// Seconds of signal drawn
    #[serde(default = "default_render_seconds")]
    pub max_seconds: f64,

    #[serde(default = "default_render_width")]
    pub width: u32,

    #[serde(default = "default_render_height")]
    pub height: u32,
}

fn default_artifact_dir() -> String {
    defaults::ARTIFACT_DIR.to_string()
}
fn default_public_base_url() -> String {
    defaults::ARTIFACT_PUBLIC_BASE_URL.to_string()
}
fn default_blob_timeout() -> u64 {
    defaults::BLOB_TIMEOUT_SECS
}
fn default_render_seconds() -> f64 {
    defaults::RENDER_MAX_SECONDS
}
fn default_render_width() -> u32 {
    defaults::RENDER_WIDTH
}
fn default_render_height() -> u32 {
    defaults::RENDER_HEIGHT
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::default(),
            local_dir: default_artifact_dir(),
            public_base_url: default_public_base_url(),
            http_endpoint: None,
            http_upload_preset: None,
            timeout_secs: default_blob_timeout(),
            max_seconds: default_render_seconds(),
            width: default_render_width(),
            height: default_render_height(),
        }
    }
}

// ============================================================================
// Narrative
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_narrative_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_narrative_model")]
    pub model: String,

    /// Name of the env var holding the API key (the key itself never lives in TOML)
    #[serde(default = "default_narrative_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_narrative_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_narrative_retries")]
    pub max_retries: u32,

    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

fn default_narrative_endpoint() -> String {
    defaults::NARRATIVE_ENDPOINT.to_string()
}
fn default_narrative_model() -> String {
    defaults::NARRATIVE_MODEL.to_string()
}
fn default_narrative_key_env() -> String {
    defaults::NARRATIVE_API_KEY_ENV.to_string()
}
fn default_narrative_timeout() -> u64 {
    defaults::NARRATIVE_TIMEOUT_SECS
}
fn default_narrative_retries() -> u32 {
    defaults::NARRATIVE_MAX_RETRIES
}
fn default_prompt_template() -> String {
    defaults::NARRATIVE_PROMPT_TEMPLATE.to_string()
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_narrative_endpoint(),
            model: default_narrative_model(),
            api_key_env: default_narrative_key_env(),
            timeout_secs: default_narrative_timeout(),
            max_retries: default_narrative_retries(),
            prompt_template: default_prompt_template(),
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionsConfig {
    /// Optional TOML file overriding or extending the built-in texts
    #[serde(default)]
    pub file: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = ServiceConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.addr, defaults::SERVER_ADDR);
        assert_eq!(config.classifier.aggregation, Aggregation::MajorityVote);
        assert_eq!(config.artifacts.backend, BlobBackend::Local);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = ServiceConfig::from_toml_str(
            r#"
[preprocessing]
lowpass_hz = 40.0

[classifier]
aggregation = "first_epoch"
"#,
        )
        .unwrap();
        assert!((config.preprocessing.lowpass_hz - 40.0).abs() < f64::EPSILON);
        assert!((config.preprocessing.highpass_hz - defaults::HIGHPASS_HZ).abs() < f64::EPSILON);
        assert_eq!(config.classifier.aggregation, Aggregation::FirstEpoch);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = ServiceConfig::default();
        config.server.max_concurrent_requests = 0;
        config.preprocessing.lowpass_hz = 0.1;
        config.narrative.timeout_secs = 0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3, "{errors:?}"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_http_backend_requires_endpoint() {
        let mut config = ServiceConfig::default();
        config.artifacts.backend = BlobBackend::Http;
        assert!(config.validate().is_err());
        config.artifacts.http_endpoint = Some("https://media.example/upload".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml_round_trips_through_parser() {
        let text = ServiceConfig::default().to_toml().unwrap();
        let parsed = ServiceConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.model.path, defaults::MODEL_PATH);
    }
}

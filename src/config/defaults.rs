//! System-wide default constants.
//!
//! Centralises the numbers the service falls back to when no config file is
//! present. Grouped by subsystem for easy discovery.

// ============================================================================
// Server
// ============================================================================

/// Default HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// In-flight screening requests admitted at once.
pub const MAX_CONCURRENT_REQUESTS: usize = 4;

/// How long a request may wait for an admission permit before `503 BUSY` (seconds).
pub const ADMISSION_TIMEOUT_SECS: u64 = 10;

/// Upload body limit (MiB). A 20-channel, 256 Hz, 1 h EDF is ~37 MiB.
pub const MAX_UPLOAD_MB: usize = 64;

/// Extension required on uploaded files.
pub const UPLOAD_EXTENSION: &str = "edf";

// ============================================================================
// Model
// ============================================================================

/// Default model file location.
pub const MODEL_PATH: &str = "models/classifier.json";

/// Analysis window the shipped model was trained on (seconds).
pub const WINDOW_SECS: f64 = 5.0;

/// Overlap between consecutive windows (seconds).
pub const OVERLAP_SECS: f64 = 1.0;

/// Margin that maps to ~76% confidence (`100 * tanh(1)`).
pub const MARGIN_SCALE: f64 = 1.0;

// ============================================================================
// Preprocessing
// ============================================================================

/// High-pass corner (Hz). Removes electrode drift.
pub const HIGHPASS_HZ: f64 = 0.5;

/// Low-pass corner (Hz). Removes mains hum and EMG.
pub const LOWPASS_HZ: f64 = 45.0;

// ============================================================================
// Artifacts
// ============================================================================

/// Blob upload timeout (seconds).
pub const BLOB_TIMEOUT_SECS: u64 = 5;

/// Seconds of raw signal drawn in the artifact.
pub const RENDER_MAX_SECONDS: f64 = 10.0;

/// Artifact bitmap size (pixels).
pub const RENDER_WIDTH: u32 = 1200;
pub const RENDER_HEIGHT: u32 = 800;

/// Local blob store directory and public prefix.
pub const ARTIFACT_DIR: &str = "artifacts";
pub const ARTIFACT_PUBLIC_BASE_URL: &str = "http://localhost:8080/artifacts";

// ============================================================================
// Narrative
// ============================================================================

/// Generative-text endpoint root.
pub const NARRATIVE_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Generative model name.
pub const NARRATIVE_MODEL: &str = "gemini-1.5-flash";

/// Environment variable holding the narrative API key.
pub const NARRATIVE_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Per-attempt narrative timeout (seconds).
pub const NARRATIVE_TIMEOUT_SECS: u64 = 8;

/// Retries after the first narrative attempt.
pub const NARRATIVE_MAX_RETRIES: u32 = 1;

/// Prompt sent with the artifact link.
pub const NARRATIVE_PROMPT_TEMPLATE: &str = "An EEG screening model classified this recording as \
{prediction} with {confidence}% confidence ({channels} channels, {duration_secs} s). \
The raw signal plot is at {artifact_url}. Give a short overview of what the plot shows and \
what the classification means for the patient. Write one single paragraph without bold text, \
lists or any other formatting.";

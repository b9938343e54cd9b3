//! Config Validation Tests
//!
//! Typo detection for `diagnos.toml` keys and collected range validation,
//! exercised independently from the rest of the pipeline.

use diagnos_eeg::config::validation::{known_config_keys, suggest_correction, validate_unknown_keys};
use diagnos_eeg::config::{BlobBackend, ConfigError, ServiceConfig};
use diagnos_eeg::knowledge::ConditionCatalog;
use diagnos_eeg::Aggregation;

use std::io::Write;
use std::path::Path;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_narrative_timeout_warns_with_suggestion() {
    let toml_str = r#"
[narrative]
timout_secs = 5
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert_eq!(warnings[0].field, "narrative.timout_secs");
    assert_eq!(warnings[0].suggestion.as_deref(), Some("narrative.timeout_secs"));
    assert!(warnings[0].to_string().contains("did you mean"));
}

#[test]
fn typo_in_preprocessing_cutoff_warns() {
    let toml_str = r#"
[preprocessing]
lowpas_hz = 40.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].suggestion.as_deref(), Some("preprocessing.lowpass_hz"));
}

#[test]
fn unknown_section_warns() {
    let toml_str = r#"
[telemetry]
enabled = true
"#;
    let warnings = validate_unknown_keys(toml_str);
    let fields: Vec<&str> = warnings.iter().map(|w| w.field.as_str()).collect();
    assert!(fields.contains(&"telemetry"));
    assert!(fields.contains(&"telemetry.enabled"));
}

#[test]
fn far_off_key_has_no_suggestion() {
    let known = known_config_keys();
    assert!(suggest_correction("completely_unrelated_setting", &known).is_none());
}

#[test]
fn valid_keys_produce_no_warnings() {
    let toml_str = r#"
[server]
addr = "127.0.0.1:9000"
max_concurrent_requests = 2

[classifier]
aggregation = "first_epoch"

[artifacts]
backend = "none"
"#;
    assert!(validate_unknown_keys(toml_str).is_empty());
}

#[test]
fn serialized_defaults_use_only_known_keys() {
    let toml_str = ServiceConfig::default().to_toml().unwrap();
    let warnings = validate_unknown_keys(&toml_str);
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
}

#[test]
fn example_config_is_clean_and_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("diagnos.example.toml");
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(validate_unknown_keys(&raw).is_empty());

    let config = ServiceConfig::load_from_file(&path).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.artifacts.backend, BlobBackend::Local);
}

#[test]
fn unparseable_toml_yields_no_key_warnings() {
    // Syntax errors surface from serde, not from the key walk
    assert!(validate_unknown_keys("[server\naddr = ").is_empty());
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn validation_collects_every_error() {
    let toml_str = r#"
[server]
addr = "not-an-address"
max_concurrent_requests = 0

[preprocessing]
highpass_hz = 40.0
lowpass_hz = 4.0

[narrative]
timeout_secs = 0
"#;
    let config = ServiceConfig::from_toml_str(toml_str).unwrap();
    match config.validate() {
        Err(ConfigError::Validation(errors)) => {
            assert_eq!(errors.len(), 4, "errors: {errors:?}");
            assert!(errors.iter().any(|e| e.contains("server.addr")));
            assert!(errors.iter().any(|e| e.contains("max_concurrent_requests")));
            assert!(errors.iter().any(|e| e.contains("lowpass_hz")));
            assert!(errors.iter().any(|e| e.contains("narrative.timeout_secs")));
        }
        other => panic!("expected validation errors, got {other:?}"),
    }
}

#[test]
fn http_backend_requires_endpoint() {
    let config = ServiceConfig::from_toml_str("[artifacts]\nbackend = \"http\"\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("http_endpoint"));
}

#[test]
fn disabled_narrative_may_omit_model() {
    let toml_str = r#"
[narrative]
enabled = false
model = ""
"#;
    let config = ServiceConfig::from_toml_str(toml_str).unwrap();
    assert!(config.validate().is_ok());
}

#[test]
fn wrong_value_type_is_parse_error() {
    let err = ServiceConfig::from_toml_str("[server]\nmax_upload_mb = \"lots\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

#[test]
fn unknown_aggregation_is_parse_error() {
    let err = ServiceConfig::from_toml_str("[classifier]\naggregation = \"mean\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

// ============================================================================
// File Loading
// ============================================================================

#[test]
fn load_from_file_reads_sections() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[classifier]\naggregation = \"first_epoch\"\n\n[model]\npath = \"/opt/models/eeg.json\""
    )
    .unwrap();

    let config = ServiceConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.classifier.aggregation, Aggregation::FirstEpoch);
    assert_eq!(config.model.path, "/opt/models/eeg.json");
    // Untouched sections keep defaults
    assert_eq!(config.server.max_concurrent_requests, 4);
}

#[test]
fn missing_file_is_io_error() {
    let err = ServiceConfig::load_from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn parse_error_carries_file_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[server]\nmax_upload_mb = -").unwrap();

    match ServiceConfig::load_from_file(file.path()) {
        Err(ConfigError::Parse(path, _)) => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {other:?}"),
    }
}

// ============================================================================
// Condition Texts
// ============================================================================

#[test]
fn condition_overrides_extend_builtins() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"[Epilepsy]
diagnosis = "Recurrent unprovoked seizures."
symptoms = "Seizures, staring spells."
remedies = "Antiepileptic medication."
diet = "Ketogenic diet under supervision."
"#
    )
    .unwrap();

    let catalog = ConditionCatalog::load(Some(file.path())).unwrap();
    assert!(catalog.contains("Epilepsy"));
    assert!(catalog.contains("Healthy"));
    assert!(catalog.contains("Schizophrenia"));
    assert_eq!(catalog.lookup("Epilepsy").diet, "Ketogenic diet under supervision.");
}

#[test]
fn condition_file_missing_field_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[Epilepsy]\ndiagnosis = \"x\"").unwrap();
    assert!(matches!(ConditionCatalog::load(Some(file.path())), Err(ConfigError::Parse(..))));
}

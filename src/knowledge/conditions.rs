//! Per-label informational texts
//!
//! Every report carries a diagnosis, symptom, remedy and diet paragraph for
//! the predicted label. The built-in catalog covers the labels the bundled
//! model emits; a TOML file can override or extend it:
//!
//! ```toml
//! [Schizophrenia]
//! diagnosis = "..."
//! symptoms = "..."
//! remedies = "..."
//! diet = "..."
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::ConfigError;
use crate::types::ConditionInfo;

fn info(diagnosis: &str, symptoms: &str, remedies: &str, diet: &str) -> ConditionInfo {
    ConditionInfo {
        diagnosis: diagnosis.to_string(),
        symptoms: symptoms.to_string(),
        remedies: remedies.to_string(),
        diet: diet.to_string(),
    }
}

fn builtin() -> HashMap<String, ConditionInfo> {
    HashMap::from([
        (
            "Healthy".to_string(),
            info(
                "The recording shows no pattern associated with schizophrenia in this screening model.",
                "No abnormal symptoms indicated by the recording.",
                "Keep regular sleep, manage stress, and seek advice if new symptoms appear.",
                "A balanced diet with whole grains, vegetables, fish and adequate hydration supports brain health.",
            ),
        ),
        (
            "Schizophrenia".to_string(),
            info(
                "The recording shows patterns the screening model associates with schizophrenia. This is not a clinical diagnosis; a psychiatrist should evaluate the result.",
                "Symptoms may include hallucinations, delusions, disorganized thinking, reduced motivation and social withdrawal.",
                "Antipsychotic medication as prescribed, psychotherapy, family support and regular follow-up with a specialist.",
                "Favour omega-3 rich fish, leafy greens, nuts and whole grains; limit caffeine, alcohol and highly processed foods.",
            ),
        ),
    ])
}

fn neutral(label: &str) -> ConditionInfo {
    info(
        &format!("The screening model predicted '{label}'. No further information is available for this label."),
        "Not available.",
        "Consult a qualified clinician to interpret this result.",
        "Not available.",
    )
}

/// Static label → texts lookup.
#[derive(Debug, Clone)]
pub struct ConditionCatalog {
    entries: HashMap<String, ConditionInfo>,
}

impl Default for ConditionCatalog {
    fn default() -> Self {
        Self { entries: builtin() }
    }
}

impl ConditionCatalog {
    /// Built-in texts, overlaid with `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut catalog = Self::default();
        if let Some(path) = path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
            let overrides = Self::parse(&contents)
                .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
            info!(path = %path.display(), labels = overrides.len(), "Loaded condition texts");
            catalog.extend(overrides);
        }
        Ok(catalog)
    }

    /// Built-in texts overlaid with a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let overrides = Self::parse(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        let mut catalog = Self::default();
        catalog.extend(overrides);
        Ok(catalog)
    }

    fn parse(contents: &str) -> Result<HashMap<String, ConditionInfo>, toml::de::Error> {
        toml::from_str(contents)
    }

    fn extend(&mut self, overrides: HashMap<String, ConditionInfo>) {
        self.entries.extend(overrides);
    }

    /// Texts for `label`. Exact match first, then case-insensitive; unknown
    /// labels get neutral texts.
    pub fn lookup(&self, label: &str) -> ConditionInfo {
        if let Some(found) = self.entries.get(label) {
            return found.clone();
        }
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| {
                debug!(label, "No condition texts for label");
                neutral(label)
            })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.keys().any(|k| k.eq_ignore_ascii_case(label))
    }

    /// Known labels, sorted.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_labels() {
        let catalog = ConditionCatalog::default();
        assert_eq!(catalog.labels(), vec!["Healthy", "Schizophrenia"]);
        assert!(catalog.lookup("Schizophrenia").symptoms.contains("hallucinations"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = ConditionCatalog::default();
        assert_eq!(catalog.lookup("healthy"), catalog.lookup("Healthy"));
    }

    #[test]
    fn test_unknown_label_gets_neutral_texts() {
        let info = ConditionCatalog::default().lookup("Epilepsy");
        assert!(info.diagnosis.contains("'Epilepsy'"));
        assert_eq!(info.symptoms, "Not available.");
    }

    #[test]
    fn test_file_overrides_and_extends() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[Healthy]
diagnosis = "custom"
symptoms = "none"
remedies = "rest"
diet = "water"

[Epilepsy]
diagnosis = "e"
symptoms = "seizures"
remedies = "meds"
diet = "keto"
"#
        )
        .unwrap();

        let catalog = ConditionCatalog::load(Some(file.path())).unwrap();
        assert_eq!(catalog.lookup("Healthy").diagnosis, "custom");
        assert_eq!(catalog.lookup("Epilepsy").diet, "keto");
        assert!(catalog.contains("schizophrenia"));
    }

    #[test]
    fn test_incomplete_entry_is_rejected() {
        let err = ConditionCatalog::from_toml_str("[Healthy]\ndiagnosis = \"only this\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_, _)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ConditionCatalog::load(Some(Path::new("/nonexistent/conditions.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }
}

//! Report and Artifact types

use serde::Serialize;

/// A rendered, stored visualization of the raw signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// Globally unique storage key (UUID v4 based)
    pub key: String,
    /// Resolvable URL returned by the blob store
    pub url: String,
}

/// Static informational texts for one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ConditionInfo {
    pub diagnosis: String,
    pub symptoms: String,
    pub remedies: String,
    pub diet: String,
}

/// Final response for one screening request.
///
/// `link` and `overview` are omitted from JSON when the optional stages failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub prediction: String,
    /// 0-100
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    pub diagnosis: String,
    pub symptoms: String,
    pub remedies: String,
    pub diet: String,
}

impl Report {
    pub fn new(
        prediction: String,
        confidence: f64,
        link: Option<String>,
        overview: Option<String>,
        info: ConditionInfo,
    ) -> Self {
        Self {
            prediction,
            // one decimal place is what the dashboard shows
            confidence: (confidence.clamp(0.0, 100.0) * 10.0).round() / 10.0,
            link,
            overview,
            diagnosis: info.diagnosis,
            symptoms: info.symptoms,
            remedies: info.remedies,
            diet: info.diet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ConditionInfo {
        ConditionInfo {
            diagnosis: "d".into(),
            symptoms: "s".into(),
            remedies: "r".into(),
            diet: "f".into(),
        }
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let report = Report::new("Healthy".into(), 87.25, None, None, info());
        let v = serde_json::to_value(&report).unwrap();
        assert!(v.get("link").is_none());
        assert!(v.get("overview").is_none());
        assert_eq!(v["prediction"], "Healthy");
        assert_eq!(v["diet"], "f");
    }

    #[test]
    fn test_confidence_is_clamped_and_rounded() {
        let report = Report::new("x".into(), 123.0, None, None, info());
        assert!((report.confidence - 100.0).abs() < f64::EPSILON);
        let report = Report::new("x".into(), 66.666, Some("u".into()), Some("o".into()), info());
        assert!((report.confidence - 66.7).abs() < 1e-9);
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["link"], "u");
    }
}

//! Classifier outputs

use serde::{Deserialize, Serialize};

/// Raw classifier output behind a confidence value.
///
/// Margins and probabilities are not interchangeable: a margin of 0.4 and a
/// probability of 0.4 mean different things, so the kind travels with the value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RawScore {
    /// Signed decision-function margin (positive favours the second label).
    Margin(f64),
    /// Probability of the predicted class.
    Probability(f64),
}

impl RawScore {
    pub fn value(&self) -> f64 {
        match self {
            RawScore::Margin(v) | RawScore::Probability(v) => *v,
        }
    }
}

/// Classification of one feature row (one epoch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Predicted label, drawn from the model's fixed label set
    pub label: String,
    /// Index of `label` within the model's label set
    pub class_index: usize,
    /// Raw model output
    pub score: RawScore,
    /// Confidence on a 0-100 scale
    pub confidence: f64,
}

/// How per-epoch results collapse into one verdict for the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Most frequent label wins; ties go to the lowest class index.
    #[default]
    MajorityVote,
    /// Only the first epoch counts.
    FirstEpoch,
}

/// Recording-level verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub label: String,
    pub class_index: usize,
    /// 0-100
    pub confidence: f64,
    /// Epochs voting for `label`
    pub supporting_epochs: usize,
    pub total_epochs: usize,
}

impl Aggregation {
    /// Collapse per-epoch results. Returns `None` for an empty slice.
    pub fn aggregate(self, results: &[ClassificationResult]) -> Option<Verdict> {
        let first = results.first()?;
        match self {
            Aggregation::FirstEpoch => Some(Verdict {
                label: first.label.clone(),
                class_index: first.class_index,
                confidence: first.confidence,
                supporting_epochs: 1,
                total_epochs: results.len(),
            }),
            Aggregation::MajorityVote => {
                let n_classes = results.iter().map(|r| r.class_index).max()? + 1;
                let mut votes = vec![0usize; n_classes];
                let mut conf_sum = vec![0.0f64; n_classes];
                for r in results {
                    votes[r.class_index] += 1;
                    conf_sum[r.class_index] += r.confidence;
                }
                // max_by_key keeps the last maximum; iterate reversed so the lowest index wins ties
                let winner = (0..n_classes).rev().max_by_key(|&i| votes[i])?;
                let label = results
                    .iter()
                    .find(|r| r.class_index == winner)
                    .map(|r| r.label.clone())?;
                Some(Verdict {
                    label,
                    class_index: winner,
                    confidence: conf_sum[winner] / votes[winner] as f64,
                    supporting_epochs: votes[winner],
                    total_epochs: results.len(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(idx: usize, conf: f64) -> ClassificationResult {
        ClassificationResult {
            label: if idx == 0 { "Healthy" } else { "Schizophrenia" }.to_string(),
            class_index: idx,
            score: RawScore::Margin(if idx == 0 { -1.0 } else { 1.0 }),
            confidence: conf,
        }
    }

    #[test]
    fn test_majority_vote_picks_most_frequent() {
        let rows = vec![result(1, 80.0), result(0, 50.0), result(1, 60.0)];
        let v = Aggregation::MajorityVote.aggregate(&rows).unwrap();
        assert_eq!(v.label, "Schizophrenia");
        assert_eq!(v.supporting_epochs, 2);
        assert_eq!(v.total_epochs, 3);
        assert!((v.confidence - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_majority_vote_tie_goes_to_lowest_index() {
        let rows = vec![result(1, 90.0), result(0, 10.0)];
        let v = Aggregation::MajorityVote.aggregate(&rows).unwrap();
        assert_eq!(v.class_index, 0);
        assert_eq!(v.label, "Healthy");
    }

    #[test]
    fn test_first_epoch_ignores_the_rest() {
        let rows = vec![result(0, 55.0), result(1, 99.0), result(1, 99.0)];
        let v = Aggregation::FirstEpoch.aggregate(&rows).unwrap();
        assert_eq!(v.label, "Healthy");
        assert!((v.confidence - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_results_yield_no_verdict() {
        assert!(Aggregation::MajorityVote.aggregate(&[]).is_none());
    }
}

//! Recording and Epoch types

use serde::Serialize;

use crate::error::PipelineError;

/// A decoded multichannel recording.
///
/// Samples are stored channel-major (`channels × samples`) in volts.
/// Construction validates shape; afterwards the recording is never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    sample_rate: f64,
    channel_labels: Vec<String>,
    data: Vec<Vec<f64>>,
}

impl Recording {
    /// Build a recording, rejecting ragged or empty sample matrices.
    pub fn new(
        sample_rate: f64,
        channel_labels: Vec<String>,
        data: Vec<Vec<f64>>,
    ) -> Result<Self, PipelineError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PipelineError::Input(format!(
                "sample rate must be a positive number, got {sample_rate}"
            )));
        }
        if data.is_empty() {
            return Err(PipelineError::Input("recording has no channels".to_string()));
        }
        if channel_labels.len() != data.len() {
            return Err(PipelineError::Input(format!(
                "{} channel labels for {} channels",
                channel_labels.len(),
                data.len()
            )));
        }
        let len = data[0].len();
        if let Some((idx, ch)) = data.iter().enumerate().find(|(_, ch)| ch.len() != len) {
            return Err(PipelineError::Input(format!(
                "channel {} ({}) has {} samples, expected {}",
                idx,
                channel_labels[idx],
                ch.len(),
                len
            )));
        }

        Ok(Self {
            sample_rate,
            channel_labels,
            data,
        })
    }

    /// Build a recording with generated labels (`CH1`, `CH2`, ...).
    pub fn from_channels(sample_rate: f64, data: Vec<Vec<f64>>) -> Result<Self, PipelineError> {
        let labels = (1..=data.len()).map(|i| format!("CH{i}")).collect();
        Self::new(sample_rate, labels, data)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.data.len()
    }

    /// Number of samples per channel.
    pub fn len(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate
    }

    pub fn channel_labels(&self) -> &[String] {
        &self.channel_labels
    }

    pub fn channel(&self, idx: usize) -> Option<&[f64]> {
        self.data.get(idx).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f64>] {
        &self.data
    }

    /// Convert a duration in seconds to a whole number of samples at this rate.
    pub fn seconds_to_samples(&self, secs: f64) -> usize {
        let n = (secs * self.sample_rate).round();
        if n.is_finite() && n > 0.0 {
            n as usize
        } else {
            0
        }
    }

    /// Consume the recording, returning labels and sample matrix.
    pub fn into_parts(self) -> (f64, Vec<String>, Vec<Vec<f64>>) {
        (self.sample_rate, self.channel_labels, self.data)
    }

    pub fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            sample_rate: self.sample_rate,
            channels: self.channel_count(),
            samples: self.len(),
            duration_secs: self.duration_secs(),
            channel_labels: self.channel_labels.clone(),
        }
    }
}

/// Header-level description of a recording (used by `inspect` and logs).
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummary {
    pub sample_rate: f64,
    pub channels: usize,
    pub samples: usize,
    pub duration_secs: f64,
    pub channel_labels: Vec<String>,
}

/// A fixed-length window over a [`Recording`].
///
/// Borrows the recording's samples; nothing is copied.
#[derive(Debug, Clone)]
pub struct Epoch<'a> {
    start: usize,
    channels: Vec<&'a [f64]>,
}

impl<'a> Epoch<'a> {
    pub(crate) fn new(start: usize, channels: Vec<&'a [f64]>) -> Self {
        Self { start, channels }
    }

    /// Offset of the first sample, in samples from the recording start.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Window length in samples.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[&'a [f64]] {
        &self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_ragged_channels() {
        let err = Recording::from_channels(256.0, vec![vec![0.0; 10], vec![0.0; 9]]).unwrap_err();
        assert!(matches!(err, PipelineError::Input(_)));
    }

    #[test]
    fn test_rejects_bad_sample_rate() {
        assert!(Recording::from_channels(0.0, vec![vec![0.0; 10]]).is_err());
        assert!(Recording::from_channels(f64::NAN, vec![vec![0.0; 10]]).is_err());
    }

    #[test]
    fn test_seconds_to_samples_rounds() {
        let rec = Recording::from_channels(256.0, vec![vec![0.0; 100]]).unwrap();
        assert_eq!(rec.seconds_to_samples(5.0), 1280);
        assert_eq!(rec.seconds_to_samples(1.0), 256);
        let odd = Recording::from_channels(160.0, vec![vec![0.0; 100]]).unwrap();
        assert_eq!(odd.seconds_to_samples(0.0031), 0);
    }

    #[test]
    fn test_summary_reports_duration() {
        let rec = Recording::from_channels(100.0, vec![vec![0.0; 250]; 3]).unwrap();
        let s = rec.summary();
        assert_eq!(s.channels, 3);
        assert_eq!(s.samples, 250);
        assert!((s.duration_secs - 2.5).abs() < 1e-12);
        assert_eq!(s.channel_labels[2], "CH3");
    }
}

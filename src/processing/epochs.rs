//! Fixed-length, overlapping epoch segmentation
//!
//! Windows of `window` samples advance by `step = window - overlap`.
//! A recording of `L` samples yields `floor((L - window) / step) + 1`
//! epochs when `L >= window`, and none otherwise. A trailing partial
//! window is dropped.

use crate::error::PipelineError;
use crate::types::{Epoch, Recording};

/// Window geometry in samples. Always satisfies `overlap < window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochWindow {
    window: usize,
    overlap: usize,
}

impl EpochWindow {
    pub fn new(window: usize, overlap: usize) -> Result<Self, PipelineError> {
        if window == 0 {
            return Err(PipelineError::Input("epoch window must be at least one sample".to_string()));
        }
        if overlap >= window {
            return Err(PipelineError::Input(format!(
                "epoch overlap ({overlap} samples) must be smaller than the window ({window} samples)"
            )));
        }
        Ok(Self { window, overlap })
    }

    /// Convert second-based geometry with `round(secs * sample_rate)`.
    pub fn from_secs(sample_rate: f64, window_secs: f64, overlap_secs: f64) -> Result<Self, PipelineError> {
        if !(window_secs.is_finite() && overlap_secs.is_finite()) || overlap_secs < 0.0 {
            return Err(PipelineError::Input(format!(
                "invalid epoch geometry: window {window_secs} s, overlap {overlap_secs} s"
            )));
        }
        let to_samples = |secs: f64| (secs * sample_rate).round().max(0.0) as usize;
        Self::new(to_samples(window_secs), to_samples(overlap_secs))
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn step(&self) -> usize {
        self.window - self.overlap
    }

    /// Number of complete epochs in `len` samples.
    pub fn epoch_count(&self, len: usize) -> usize {
        if len < self.window {
            0
        } else {
            (len - self.window) / self.step() + 1
        }
    }
}

/// Lazy iterator over the epochs of one recording.
///
/// Clone it before iterating to walk the same epochs twice.
#[derive(Debug, Clone)]
pub struct Epochs<'a> {
    recording: &'a Recording,
    geometry: EpochWindow,
    next: usize,
    total: usize,
}

impl<'a> Epochs<'a> {
    pub fn geometry(&self) -> EpochWindow {
        self.geometry
    }
}

impl<'a> Iterator for Epochs<'a> {
    type Item = Epoch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let start = self.next * self.geometry.step();
        let end = start + self.geometry.window;
        self.next += 1;
        let channels = self
            .recording
            .channels()
            .iter()
            .map(|c| &c[start..end])
            .collect();
        Some(Epoch::new(start, channels))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Epochs<'_> {}

/// Slice `recording` into epochs of `window` samples overlapping by `overlap`.
pub fn segment(recording: &Recording, window: usize, overlap: usize) -> Result<Epochs<'_>, PipelineError> {
    Ok(segment_with(recording, EpochWindow::new(window, overlap)?))
}

/// Slice `recording` using pre-validated geometry.
pub fn segment_with(recording: &Recording, geometry: EpochWindow) -> Epochs<'_> {
    Epochs {
        recording,
        geometry,
        next: 0,
        total: geometry.epoch_count(recording.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(sr: f64, n: usize, channels: usize) -> Recording {
        let data = (0..channels)
            .map(|c| (0..n).map(|i| (i + c * n) as f64).collect())
            .collect();
        Recording::from_channels(sr, data).unwrap()
    }

    #[test]
    fn test_five_minute_recording_geometry() {
        // (76800 - 1280) / 1024 = 73.75 -> 73 + 1
        let rec = ramp(256.0, 256 * 300, 1);
        let geometry = EpochWindow::from_secs(256.0, 5.0, 1.0).unwrap();
        assert_eq!(geometry.window(), 1280);
        assert_eq!(geometry.overlap(), 256);
        assert_eq!(segment_with(&rec, geometry).count(), 74);

        // one more step of samples gives exactly 75 epochs
        let rec = ramp(256.0, 1280 + 74 * 1024, 1);
        assert_eq!(segment_with(&rec, geometry).count(), 75);
    }

    #[test]
    fn test_epoch_count_law() {
        for len in [1280usize, 1281, 2303, 2304, 5000, 76_800] {
            let g = EpochWindow::new(1280, 256).unwrap();
            let expected = (len - 1280) / 1024 + 1;
            assert_eq!(g.epoch_count(len), expected, "len {len}");
        }
    }

    #[test]
    fn test_short_recording_has_no_epochs() {
        let rec = ramp(256.0, 1279, 2);
        let mut epochs = segment(&rec, 1280, 256).unwrap();
        assert_eq!(epochs.len(), 0);
        assert!(epochs.next().is_none());
    }

    #[test]
    fn test_exact_window_yields_one_epoch() {
        let rec = ramp(256.0, 1280, 1);
        assert_eq!(segment(&rec, 1280, 256).unwrap().count(), 1);
    }

    #[test]
    fn test_starts_strictly_increase_by_step() {
        let rec = ramp(100.0, 1000, 3);
        let starts: Vec<usize> = segment(&rec, 200, 50).unwrap().map(|e| e.start()).collect();
        assert_eq!(starts.first(), Some(&0));
        assert!(starts.windows(2).all(|w| w[1] - w[0] == 150));
    }

    #[test]
    fn test_epoch_borrows_the_right_samples() {
        let rec = ramp(100.0, 1000, 2);
        let second = segment(&rec, 200, 50).unwrap().nth(1).unwrap();
        assert_eq!(second.len(), 200);
        assert_eq!(second.channel_count(), 2);
        assert_eq!(second.channels()[0][0], 150.0);
        assert_eq!(second.channels()[1][0], 1150.0);
    }

    #[test]
    fn test_clone_iterates_independently() {
        let rec = ramp(100.0, 1000, 1);
        let mut a = segment(&rec, 200, 0).unwrap();
        a.next();
        let b = a.clone();
        assert_eq!(a.count(), 4);
        assert_eq!(b.count(), 4);
    }

    #[test]
    fn test_invalid_overlap_is_input_error() {
        let rec = ramp(100.0, 1000, 1);
        assert!(matches!(segment(&rec, 100, 100), Err(PipelineError::Input(_))));
        assert!(matches!(segment(&rec, 0, 0), Err(PipelineError::Input(_))));
        assert!(EpochWindow::from_secs(100.0, 1.0, -0.5).is_err());
    }
}

//! Recording preprocessing: average re-reference and zero-phase band-pass
//!
//! Each cut-off is a 2nd-order Butterworth section run forward then backward
//! (`filtfilt`), so the pass-band has no phase shift and the effective
//! magnitude response is squared.

use tracing::debug;

use crate::config::PreprocessingConfig;
use crate::error::PipelineError;
use crate::types::Recording;

/// Samples mirrored at each edge before filtering.
const EDGE_PAD: usize = 9;

// ============================================================================
// Biquad
// ============================================================================

/// Second-order section coefficients, normalised so `a0 = 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl BiquadCoeffs {
    /// Butterworth low-pass (bilinear transform, pre-warped).
    pub fn lowpass(sample_rate: f64, cutoff: f64) -> Self {
        let k = (std::f64::consts::PI * cutoff / sample_rate).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + std::f64::consts::SQRT_2 * k + k2);
        Self {
            b: [k2 * norm, 2.0 * k2 * norm, k2 * norm],
            a: [
                1.0,
                2.0 * (k2 - 1.0) * norm,
                (1.0 - std::f64::consts::SQRT_2 * k + k2) * norm,
            ],
        }
    }

    /// Butterworth high-pass (bilinear transform, pre-warped).
    pub fn highpass(sample_rate: f64, cutoff: f64) -> Self {
        let k = (std::f64::consts::PI * cutoff / sample_rate).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + std::f64::consts::SQRT_2 * k + k2);
        Self {
            b: [norm, -2.0 * norm, norm],
            a: [
                1.0,
                2.0 * (k2 - 1.0) * norm,
                (1.0 - std::f64::consts::SQRT_2 * k + k2) * norm,
            ],
        }
    }

    /// DC gain `H(z = 1)`.
    fn dc_gain(&self) -> f64 {
        let den = self.a[0] + self.a[1] + self.a[2];
        if den.abs() < f64::EPSILON {
            0.0
        } else {
            (self.b[0] + self.b[1] + self.b[2]) / den
        }
    }
}

/// Biquad in transposed direct form II.
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    z: [f64; 2],
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self { coeffs, z: [0.0; 2] }
    }

    /// Process a single sample.
    pub fn filter(&mut self, x: f64) -> f64 {
        let BiquadCoeffs { b, a } = self.coeffs;
        let y = b[0] * x + self.z[0];
        self.z[0] = b[1] * x - a[1] * y + self.z[1];
        self.z[1] = b[2] * x - a[2] * y;
        y
    }

    /// Load the state a constant input `x0` would settle into,
    /// so the first output carries no start-up transient.
    pub fn settle(&mut self, x0: f64) {
        let BiquadCoeffs { b, a } = self.coeffs;
        let y0 = self.coeffs.dc_gain() * x0;
        self.z[1] = b[2] * x0 - a[2] * y0;
        self.z[0] = y0 - b[0] * x0;
    }

    pub fn reset(&mut self) {
        self.z = [0.0; 2];
    }

    /// Filter a whole buffer in place.
    pub fn run(&mut self, buf: &mut [f64]) {
        for v in buf.iter_mut() {
            *v = self.filter(*v);
        }
    }
}

/// Zero-phase filtering with odd-reflection edge padding.
pub fn filtfilt(coeffs: BiquadCoeffs, signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n < 2 {
        return signal.to_vec();
    }
    let pad = EDGE_PAD.min(n - 1);

    // Odd extension: 2*x[0] - x[pad..1], signal, 2*x[n-1] - x[n-2..n-1-pad]
    let mut ext = Vec::with_capacity(n + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * signal[0] - signal[i]));
    ext.extend_from_slice(signal);
    ext.extend((1..=pad).map(|i| 2.0 * signal[n - 1] - signal[n - 1 - i]));

    let mut section = Biquad::new(coeffs);
    section.settle(ext[0]);
    section.run(&mut ext);

    ext.reverse();
    section.reset();
    section.settle(ext[0]);
    section.run(&mut ext);
    ext.reverse();

    ext[pad..pad + n].to_vec()
}

// ============================================================================
// Re-referencing
// ============================================================================

/// Subtract the per-sample mean across channels from every channel.
pub fn average_reference(channels: &mut [Vec<f64>]) {
    let n_ch = channels.len();
    if n_ch < 2 {
        return;
    }
    let len = channels[0].len();
    for i in 0..len {
        let mean = channels.iter().map(|c| c[i]).sum::<f64>() / n_ch as f64;
        for c in channels.iter_mut() {
            c[i] -= mean;
        }
    }
}

// ============================================================================
// Preprocessor
// ============================================================================

/// Applies the configured re-reference and band-pass to a recording.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessingConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    /// Returns a new, filtered recording. The input is left untouched;
    /// the artifact renderer draws the raw signal.
    pub fn apply(&self, recording: &Recording) -> Result<Recording, PipelineError> {
        if !self.config.enabled {
            return Ok(recording.clone());
        }

        let sr = recording.sample_rate();
        let nyquist = sr / 2.0;
        let mut data = recording.channels().to_vec();

        if self.config.average_reference {
            average_reference(&mut data);
        }

        let highpass = (self.config.highpass_hz < nyquist)
            .then(|| BiquadCoeffs::highpass(sr, self.config.highpass_hz));
        let lowpass = (self.config.lowpass_hz < nyquist)
            .then(|| BiquadCoeffs::lowpass(sr, self.config.lowpass_hz));

        debug!(
            sample_rate = sr,
            highpass = highpass.is_some(),
            lowpass = lowpass.is_some(),
            "Preprocessing recording"
        );

        for channel in data.iter_mut() {
            if let Some(c) = highpass {
                *channel = filtfilt(c, channel);
            }
            if let Some(c) = lowpass {
                *channel = filtfilt(c, channel);
            }
        }

        Recording::new(sr, recording.channel_labels().to_vec(), data)
    }
}

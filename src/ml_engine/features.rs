//! Per-epoch statistical feature extraction
//!
//! Thirteen statistics are computed for every channel of an epoch, in the
//! fixed order of [`Statistic::ALL`]. The order and the [`FeatureLayout`]
//! are part of the classifier contract: a model trained on one arrangement
//! gives meaningless answers on another.
//!
//! Moment-based statistics follow the population / biased conventions:
//! `var = m2`, `skew = m3 / m2^1.5`, `kurtosis = m4 / m2^2 - 3`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::error::PipelineError;
use crate::types::Epoch;

/// Statistics per channel.
pub const STAT_COUNT: usize = 13;

/// Below this `m2` a channel counts as flat and its shape statistics are zero.
const FLAT_VARIANCE: f64 = 1e-30;

// ============================================================================
// Statistic table
// ============================================================================

/// One per-channel statistic. Discriminants give the position in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Mean = 0,
    Std = 1,
    PeakToPeak = 2,
    Variance = 3,
    Min = 4,
    Max = 5,
    ArgMin = 6,
    ArgMax = 7,
    MeanSquare = 8,
    Rms = 9,
    SumAbsDiff = 10,
    Skewness = 11,
    Kurtosis = 12,
}

impl Statistic {
    /// Canonical order of the feature table.
    pub const ALL: [Statistic; STAT_COUNT] = [
        Statistic::Mean,
        Statistic::Std,
        Statistic::PeakToPeak,
        Statistic::Variance,
        Statistic::Min,
        Statistic::Max,
        Statistic::ArgMin,
        Statistic::ArgMax,
        Statistic::MeanSquare,
        Statistic::Rms,
        Statistic::SumAbsDiff,
        Statistic::Skewness,
        Statistic::Kurtosis,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Std => "std",
            Statistic::PeakToPeak => "ptp",
            Statistic::Variance => "var",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::ArgMin => "argmin",
            Statistic::ArgMax => "argmax",
            Statistic::MeanSquare => "mean_square",
            Statistic::Rms => "rms",
            Statistic::SumAbsDiff => "sum_abs_diff",
            Statistic::Skewness => "skewness",
            Statistic::Kurtosis => "kurtosis",
        }
    }
}

/// Compute the full statistic table for one channel, indexed by `Statistic as usize`.
///
/// `samples` must be non-empty.
pub fn channel_statistics(samples: &[f64]) -> [f64; STAT_COUNT] {
    let n = samples.len() as f64;
    let mean = samples.mean();
    let variance = samples.population_variance();
    let std = samples.population_std_dev();
    let rms = samples.quadratic_mean();

    // First occurrence wins for both extremes
    let (mut min, mut max) = (samples[0], samples[0]);
    let (mut arg_min, mut arg_max) = (0usize, 0usize);
    for (i, &v) in samples.iter().enumerate().skip(1) {
        if v < min {
            min = v;
            arg_min = i;
        }
        if v > max {
            max = v;
            arg_max = i;
        }
    }

    let sum_abs_diff: f64 = samples.windows(2).map(|w| (w[1] - w[0]).abs()).sum();

    let (m2, m3, m4) = samples.iter().fold((0.0, 0.0, 0.0), |(a2, a3, a4), &v| {
        let d = v - mean;
        let d2 = d * d;
        (a2 + d2, a3 + d2 * d, a4 + d2 * d2)
    });
    let (m2, m3, m4) = (m2 / n, m3 / n, m4 / n);
    let (skewness, kurtosis) = if m2 <= FLAT_VARIANCE {
        (0.0, 0.0)
    } else {
        (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
    };

    let mut out = [0.0; STAT_COUNT];
    out[Statistic::Mean as usize] = mean;
    out[Statistic::Std as usize] = std;
    out[Statistic::PeakToPeak as usize] = max - min;
    out[Statistic::Variance as usize] = variance;
    out[Statistic::Min as usize] = min;
    out[Statistic::Max as usize] = max;
    out[Statistic::ArgMin as usize] = arg_min as f64;
    out[Statistic::ArgMax as usize] = arg_max as f64;
    out[Statistic::MeanSquare as usize] = rms * rms;
    out[Statistic::Rms as usize] = rms;
    out[Statistic::SumAbsDiff as usize] = sum_abs_diff;
    out[Statistic::Skewness as usize] = skewness;
    out[Statistic::Kurtosis as usize] = kurtosis;
    out
}

// ============================================================================
// Layout
// ============================================================================

/// Arrangement of the `13 x C` values inside one feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureLayout {
    /// `mean[ch0..chC], std[ch0..chC], ...`
    #[default]
    StatisticMajor,
    /// `ch0[mean..kurtosis], ch1[mean..kurtosis], ...`
    ChannelMajor,
}

impl FeatureLayout {
    /// Column index of `stat` for `channel` in a vector covering `channels` channels.
    pub fn column(self, stat: Statistic, channel: usize, channels: usize) -> usize {
        match self {
            FeatureLayout::StatisticMajor => stat as usize * channels + channel,
            FeatureLayout::ChannelMajor => channel * STAT_COUNT + stat as usize,
        }
    }

    /// Human-readable name of every column, e.g. `"mean:Fp1"`.
    pub fn column_names(self, channel_labels: &[String]) -> Vec<String> {
        let c = channel_labels.len();
        let mut names = vec![String::new(); STAT_COUNT * c];
        for stat in Statistic::ALL {
            for (ch, label) in channel_labels.iter().enumerate() {
                names[self.column(stat, ch, c)] = format!("{}:{}", stat.name(), label);
            }
        }
        names
    }
}

// ============================================================================
// Feature matrix
// ============================================================================

/// Row-major `epochs x (13 * C)` feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Build from equal-length rows.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, PipelineError> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(PipelineError::SchemaMismatch {
                expected: cols,
                actual: bad.len(),
            });
        }
        let n = rows.len();
        Ok(Self {
            rows: n,
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, idx: usize) -> Option<&[f64]> {
        (idx < self.rows).then(|| &self.data[idx * self.cols..(idx + 1) * self.cols])
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.rows).map(move |i| &self.data[i * self.cols..(i + 1) * self.cols])
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// Maps epochs to feature vectors in a fixed layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor {
    layout: FeatureLayout,
}

impl FeatureExtractor {
    pub fn new(layout: FeatureLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    /// Feature vector of length `13 x channel_count`.
    pub fn extract(&self, epoch: &Epoch<'_>) -> Vec<f64> {
        let channels = epoch.channel_count();
        let mut row = vec![0.0; STAT_COUNT * channels];
        for (ch, samples) in epoch.channels().iter().enumerate() {
            if samples.is_empty() {
                continue;
            }
            let stats = channel_statistics(samples);
            for stat in Statistic::ALL {
                row[self.layout.column(stat, ch, channels)] = stats[stat as usize];
            }
        }
        row
    }

    /// Extract every epoch in parallel. Row `i` always belongs to epoch `i`.
    pub fn extract_all<'a, I>(&self, epochs: I) -> FeatureMatrix
    where
        I: IntoIterator<Item = Epoch<'a>>,
    {
        let epochs: Vec<Epoch<'a>> = epochs.into_iter().collect();
        let cols = epochs.first().map_or(0, |e| STAT_COUNT * e.channel_count());
        let rows: Vec<Vec<f64>> = epochs.par_iter().map(|e| self.extract(e)).collect();

        debug!(rows = rows.len(), cols, layout = ?self.layout, "Feature matrix extracted");

        FeatureMatrix {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::segment;
    use crate::types::Recording;

    fn stat(x: &[f64], s: Statistic) -> f64 {
        channel_statistics(x)[s as usize]
    }

    #[test]
    fn test_table_order_is_fixed() {
        let names: Vec<&str> = Statistic::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            [
                "mean", "std", "ptp", "var", "min", "max", "argmin", "argmax",
                "mean_square", "rms", "sum_abs_diff", "skewness", "kurtosis"
            ]
        );
        for (i, s) in Statistic::ALL.iter().enumerate() {
            assert_eq!(*s as usize, i);
        }
    }

    #[test]
    fn test_basic_statistics() {
        let x = [1.0, 3.0, -2.0, 3.0, 0.0];
        assert!((stat(&x, Statistic::Mean) - 1.0).abs() < 1e-12);
        // population variance: (0 + 4 + 9 + 4 + 1) / 5
        assert!((stat(&x, Statistic::Variance) - 3.6).abs() < 1e-12);
        assert!((stat(&x, Statistic::Std) - 3.6f64.sqrt()).abs() < 1e-12);
        assert!((stat(&x, Statistic::PeakToPeak) - 5.0).abs() < 1e-12);
        assert_eq!(stat(&x, Statistic::ArgMin), 2.0);
        // first of the two maxima
        assert_eq!(stat(&x, Statistic::ArgMax), 1.0);
        assert!((stat(&x, Statistic::MeanSquare) - 23.0 / 5.0).abs() < 1e-12);
        assert!((stat(&x, Statistic::Rms) - (23.0f64 / 5.0).sqrt()).abs() < 1e-12);
        assert!((stat(&x, Statistic::SumAbsDiff) - (2.0 + 5.0 + 5.0 + 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_shape_statistics_match_biased_moments() {
        let x = [0.0, 0.0, 0.0, 1.0];
        // mean 0.25; m2 = 0.1875, m3 = 0.09375, m4 = 0.08203125
        let m2: f64 = 0.1875;
        let skew = 0.09375 / m2.powf(1.5);
        let kurt = 0.08203125 / (m2 * m2) - 3.0;
        assert!((stat(&x, Statistic::Skewness) - skew).abs() < 1e-12);
        assert!((stat(&x, Statistic::Kurtosis) - kurt).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_noise_shape_statistics() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let x: Vec<f64> = (0..20_000).map(|_| rng.gen_range(-1.0..1.0)).collect();
        // Uniform distribution: skewness 0, excess kurtosis -1.2
        assert!(stat(&x, Statistic::Skewness).abs() < 0.1);
        assert!((stat(&x, Statistic::Kurtosis) + 1.2).abs() < 0.1);
        assert!((stat(&x, Statistic::Variance) - 1.0 / 3.0).abs() < 0.02);
    }

    #[test]
    fn test_flat_channel_has_zero_shape_statistics() {
        let x = [2.5; 64];
        let s = channel_statistics(&x);
        assert_eq!(s[Statistic::Skewness as usize], 0.0);
        assert_eq!(s[Statistic::Kurtosis as usize], 0.0);
        assert_eq!(s[Statistic::Std as usize], 0.0);
        assert!(s.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_layouts_place_columns() {
        assert_eq!(FeatureLayout::StatisticMajor.column(Statistic::Std, 2, 19), 21);
        assert_eq!(FeatureLayout::ChannelMajor.column(Statistic::Std, 2, 19), 27);
        let names = FeatureLayout::StatisticMajor.column_names(&["A".into(), "B".into()]);
        assert_eq!(names[0], "mean:A");
        assert_eq!(names[1], "mean:B");
        assert_eq!(names[2], "std:A");
    }

    #[test]
    fn test_vector_length_and_layout_consistency() {
        let data = vec![vec![1.0, 2.0, 4.0, 8.0], vec![-1.0, 0.0, 1.0, 0.0], vec![5.0; 4]];
        let rec = Recording::from_channels(4.0, data).unwrap();
        let epoch = segment(&rec, 4, 0).unwrap().next().unwrap();

        let sm = FeatureExtractor::new(FeatureLayout::StatisticMajor).extract(&epoch);
        let cm = FeatureExtractor::new(FeatureLayout::ChannelMajor).extract(&epoch);
        assert_eq!(sm.len(), 13 * 3);
        assert_eq!(cm.len(), 13 * 3);
        for stat in Statistic::ALL {
            for ch in 0..3 {
                assert_eq!(
                    sm[FeatureLayout::StatisticMajor.column(stat, ch, 3)],
                    cm[FeatureLayout::ChannelMajor.column(stat, ch, 3)]
                );
            }
        }
    }

    #[test]
    fn test_matrix_preserves_epoch_order_and_is_deterministic() {
        let n = 256 * 30;
        let data: Vec<Vec<f64>> = (0..4)
            .map(|c| (0..n).map(|i| ((i * (c + 3)) % 97) as f64).collect())
            .collect();
        let rec = Recording::from_channels(256.0, data).unwrap();
        let extractor = FeatureExtractor::default();

        let a = extractor.extract_all(segment(&rec, 1280, 256).unwrap());
        let b = extractor.extract_all(segment(&rec, 1280, 256).unwrap());
        assert_eq!(a, b);
        assert_eq!(a.cols(), 52);

        let sequential: Vec<Vec<f64>> = segment(&rec, 1280, 256)
            .unwrap()
            .map(|e| extractor.extract(&e))
            .collect();
        assert_eq!(a.rows(), sequential.len());
        for (i, row) in sequential.iter().enumerate() {
            assert_eq!(a.row(i).unwrap(), row.as_slice());
        }
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        let err = FeatureMatrix::from_rows(vec![vec![0.0; 3], vec![0.0; 2]]).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { expected: 3, actual: 2 }));
    }
}

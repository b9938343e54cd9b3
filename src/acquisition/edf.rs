//! EDF / EDF+ container decoder
//!
//! European Data Format layout:
//!
//! ```text
//! [256 B fixed header][ns × 256 B signal headers, field-major][data records]
//! ```
//!
//! Each data record holds, for every signal in order, `samples_per_record`
//! little-endian `i16` values. Digital values map to physical units with
//! `(d - dmin) * (pmax - pmin) / (dmax - dmin) + pmin`.
//!
//! `EDF Annotations` signals (EDF+) carry TAL text, not samples, and are skipped.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::types::Recording;

/// Size of the fixed header and of each per-signal header block.
const HEADER_BLOCK: usize = 256;

/// Label used by EDF+ for annotation channels.
const ANNOTATION_LABEL: &str = "EDF Annotations";

/// Digital range written by [`encode`].
const ENCODE_DIGITAL_MIN: i32 = -32768;
const ENCODE_DIGITAL_MAX: i32 = 32767;

/// EDF decoding errors
#[derive(Debug, Error)]
pub enum EdfError {
    #[error("File too short: {0} bytes, header needs at least {HEADER_BLOCK}")]
    TooShort(usize),

    #[error("Not an EDF file (version field {0:?})")]
    BadVersion(String),

    #[error("Invalid header field {field}: {value:?}")]
    BadField { field: &'static str, value: String },

    #[error("No signal channels in recording")]
    NoSignals,

    #[error("Channels use different sample rates ({0} Hz vs {1} Hz)")]
    MixedSampleRates(f64, f64),

    #[error("Data section holds no complete record (record size {record_bytes} B, payload {payload} B)")]
    NoRecords { record_bytes: usize, payload: usize },

    #[error("Cannot encode: {0}")]
    Encode(String),
}

impl From<EdfError> for PipelineError {
    fn from(e: EdfError) -> Self {
        PipelineError::Input(e.to_string())
    }
}

/// Parsed per-signal header
#[derive(Debug, Clone, Serialize)]
pub struct SignalHeader {
    pub label: String,
    pub physical_dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: f64,
    pub digital_max: f64,
    pub samples_per_record: usize,
}

impl SignalHeader {
    fn is_annotation(&self) -> bool {
        self.label == ANNOTATION_LABEL
    }

    /// Multiplier converting this signal's physical unit to volts.
    fn volts_per_unit(&self) -> f64 {
        match self.physical_dimension.to_lowercase().as_str() {
            "uv" | "µv" | "μv" => 1e-6,
            "mv" => 1e-3,
            "nv" => 1e-9,
            // "V", or a unit we do not know: take values as-is
            _ => 1.0,
        }
    }

    /// Linear (gain, offset) mapping a digital value to volts.
    fn calibration(&self) -> (f64, f64) {
        let span = self.digital_max - self.digital_min;
        let gain = if span == 0.0 {
            1.0
        } else {
            (self.physical_max - self.physical_min) / span
        };
        let offset = self.physical_min - gain * self.digital_min;
        let unit = self.volts_per_unit();
        (gain * unit, offset * unit)
    }
}

/// Parsed fixed + signal headers
#[derive(Debug, Clone, Serialize)]
pub struct EdfHeader {
    pub patient: String,
    pub recording: String,
    pub start_date: String,
    pub start_time: String,
    pub header_bytes: usize,
    /// `-1` in the file means "unknown"; stored as `None`
    pub n_records: Option<usize>,
    pub record_duration_secs: f64,
    pub signals: Vec<SignalHeader>,
}

impl EdfHeader {
    /// Total bytes of one data record across all signals.
    pub fn record_bytes(&self) -> usize {
        self.signals.iter().map(|s| s.samples_per_record * 2).sum()
    }
}

fn ascii_field(bytes: &[u8], start: usize, len: usize) -> String {
    String::from_utf8_lossy(&bytes[start..start + len])
        .trim()
        .to_string()
}

fn number_field(bytes: &[u8], start: usize, len: usize, field: &'static str) -> Result<f64, EdfError> {
    let raw = ascii_field(bytes, start, len);
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(EdfError::BadField { field, value: raw })
}

fn count_field(bytes: &[u8], start: usize, len: usize, field: &'static str) -> Result<usize, EdfError> {
    let raw = ascii_field(bytes, start, len);
    raw.parse::<usize>()
        .map_err(|_| EdfError::BadField { field, value: raw })
}

/// Parse the fixed header and all signal headers.
pub fn parse_header(bytes: &[u8]) -> Result<EdfHeader, EdfError> {
    if bytes.len() < HEADER_BLOCK {
        return Err(EdfError::TooShort(bytes.len()));
    }

    let version = ascii_field(bytes, 0, 8);
    if version != "0" {
        return Err(EdfError::BadVersion(version));
    }

    let header_bytes = count_field(bytes, 184, 8, "header_bytes")?;
    let n_records_raw = ascii_field(bytes, 236, 8);
    let n_records = match n_records_raw.parse::<i64>() {
        Ok(-1) => None,
        Ok(n) if n >= 0 => Some(n as usize),
        _ => {
            return Err(EdfError::BadField {
                field: "n_records",
                value: n_records_raw,
            })
        }
    };
    let record_duration_secs = number_field(bytes, 244, 8, "record_duration")?;
    let ns = count_field(bytes, 252, 4, "n_signals")?;
    if ns == 0 {
        return Err(EdfError::NoSignals);
    }

    let expected_header = HEADER_BLOCK * (ns + 1);
    if bytes.len() < expected_header {
        return Err(EdfError::TooShort(bytes.len()));
    }
    if header_bytes != expected_header {
        warn!(
            declared = header_bytes,
            computed = expected_header,
            "EDF header size field disagrees with signal count, using computed size"
        );
    }

    // Signal header fields are stored field-major: all labels, then all transducers, ...
    let mut offset = HEADER_BLOCK;
    let mut column = |width: usize| {
        let starts: Vec<usize> = (0..ns).map(|i| offset + i * width).collect();
        offset += ns * width;
        starts
    };
    let labels = column(16);
    let _transducers = column(80);
    let dims = column(8);
    let pmins = column(8);
    let pmaxs = column(8);
    let dmins = column(8);
    let dmaxs = column(8);
    let _prefilters = column(80);
    let counts = column(8);

    let mut signals = Vec::with_capacity(ns);
    for i in 0..ns {
        signals.push(SignalHeader {
            label: ascii_field(bytes, labels[i], 16),
            physical_dimension: ascii_field(bytes, dims[i], 8),
            physical_min: number_field(bytes, pmins[i], 8, "physical_min")?,
            physical_max: number_field(bytes, pmaxs[i], 8, "physical_max")?,
            digital_min: number_field(bytes, dmins[i], 8, "digital_min")?,
            digital_max: number_field(bytes, dmaxs[i], 8, "digital_max")?,
            samples_per_record: count_field(bytes, counts[i], 8, "samples_per_record")?,
        });
    }

    Ok(EdfHeader {
        patient: ascii_field(bytes, 8, 80),
        recording: ascii_field(bytes, 88, 80),
        start_date: ascii_field(bytes, 168, 8),
        start_time: ascii_field(bytes, 176, 8),
        header_bytes: expected_header,
        n_records,
        record_duration_secs,
        signals,
    })
}

/// Decode a complete EDF file into a [`Recording`] in volts.
pub fn decode(bytes: &[u8]) -> Result<Recording, EdfError> {
    let header = parse_header(bytes)?;

    let data_signals: Vec<(usize, &SignalHeader)> = header
        .signals
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_annotation())
        .collect();
    if data_signals.is_empty() {
        return Err(EdfError::NoSignals);
    }
    if header.record_duration_secs <= 0.0 {
        return Err(EdfError::BadField {
            field: "record_duration",
            value: header.record_duration_secs.to_string(),
        });
    }

    let rate_of = |s: &SignalHeader| s.samples_per_record as f64 / header.record_duration_secs;
    let sample_rate = rate_of(data_signals[0].1);
    for (_, s) in &data_signals[1..] {
        let r = rate_of(s);
        if (r - sample_rate).abs() > 1e-9 {
            return Err(EdfError::MixedSampleRates(sample_rate, r));
        }
    }
    if data_signals[0].1.samples_per_record == 0 {
        return Err(EdfError::BadField {
            field: "samples_per_record",
            value: "0".to_string(),
        });
    }

    let record_bytes = header.record_bytes();
    let payload = &bytes[header.header_bytes..];
    let available = if record_bytes == 0 { 0 } else { payload.len() / record_bytes };
    let n_records = match header.n_records {
        Some(n) if n <= available => n,
        Some(n) => {
            warn!(declared = n, available, "EDF payload truncated, decoding complete records only");
            available
        }
        None => available,
    };
    if n_records == 0 {
        return Err(EdfError::NoRecords {
            record_bytes,
            payload: payload.len(),
        });
    }

    // Byte offset of each signal inside a record
    let mut signal_offsets = Vec::with_capacity(header.signals.len());
    let mut acc = 0usize;
    for s in &header.signals {
        signal_offsets.push(acc);
        acc += s.samples_per_record * 2;
    }

    let mut data: Vec<Vec<f64>> = data_signals
        .iter()
        .map(|(_, s)| Vec::with_capacity(s.samples_per_record * n_records))
        .collect();

    for rec in 0..n_records {
        let record = &payload[rec * record_bytes..(rec + 1) * record_bytes];
        for (slot, (sig_idx, sig)) in data_signals.iter().enumerate() {
            let (gain, offset) = sig.calibration();
            let start = signal_offsets[*sig_idx];
            let end = start + sig.samples_per_record * 2;
            data[slot].extend(
                record[start..end]
                    .chunks_exact(2)
                    .map(|b| f64::from(i16::from_le_bytes([b[0], b[1]])) * gain + offset),
            );
        }
    }

    let labels = data_signals.iter().map(|(_, s)| s.label.clone()).collect();
    debug!(
        channels = data.len(),
        records = n_records,
        sample_rate,
        "EDF decoded"
    );

    Recording::new(sample_rate, labels, data).map_err(|e| EdfError::BadField {
        field: "data",
        value: e.to_string(),
    })
}

/// Format a number into an EDF fixed-width ASCII field.
fn format_number(value: f64, width: usize) -> Result<String, EdfError> {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        let s = format!("{}", value as i64);
        if s.len() <= width {
            return Ok(s);
        }
    }
    for decimals in (0..=width).rev() {
        let s = format!("{value:.decimals$}");
        let s = if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            s
        };
        if s.len() <= width {
            return Ok(s);
        }
    }
    Err(EdfError::Encode(format!("{value} does not fit in {width} characters")))
}

fn push_field(out: &mut Vec<u8>, value: &str, width: usize) {
    let mut bytes: Vec<u8> = value.bytes().filter(u8::is_ascii).take(width).collect();
    bytes.resize(width, b' ');
    out.extend_from_slice(&bytes);
}

/// Encode a [`Recording`] as EDF with microvolt physical units.
///
/// Uses one-second records when the sample rate is integral and the length is a
/// whole number of seconds, otherwise a single record spanning the recording.
pub fn encode(recording: &Recording) -> Result<Vec<u8>, EdfError> {
    let sr = recording.sample_rate();
    let len = recording.len();
    if len == 0 {
        return Err(EdfError::Encode("recording is empty".to_string()));
    }
    let whole_seconds = sr.fract() == 0.0 && len % (sr as usize) == 0;
    let (samples_per_record, n_records, duration) = if whole_seconds {
        (sr as usize, len / sr as usize, 1.0)
    } else {
        (len, 1, len as f64 / sr)
    };

    let ns = recording.channel_count();
    let mut out = Vec::with_capacity(HEADER_BLOCK * (ns + 1) + len * ns * 2);

    push_field(&mut out, "0", 8);
    push_field(&mut out, "X X X X", 80);
    push_field(&mut out, "Startdate X X X X", 80);
    push_field(&mut out, "01.01.00", 8);
    push_field(&mut out, "00.00.00", 8);
    push_field(&mut out, &(HEADER_BLOCK * (ns + 1)).to_string(), 8);
    push_field(&mut out, "", 44);
    push_field(&mut out, &n_records.to_string(), 8);
    push_field(&mut out, &format_number(duration, 8)?, 8);
    push_field(&mut out, &ns.to_string(), 4);

    // Physical range per channel in microvolts
    let ranges: Vec<(f64, f64)> = recording
        .channels()
        .iter()
        .map(|ch| {
            let lo = ch.iter().copied().fold(f64::INFINITY, f64::min) * 1e6;
            let hi = ch.iter().copied().fold(f64::NEG_INFINITY, f64::max) * 1e6;
            if hi - lo < 1e-6 {
                (lo - 1.0, hi + 1.0)
            } else {
                (lo, hi)
            }
        })
        .collect();
    // Round outward so the formatted limits still bracket every sample
    let mut limits = Vec::with_capacity(ns);
    for &(lo, hi) in &ranges {
        let lo_s = format_number(lo.floor(), 8)?;
        let hi_s = format_number(hi.ceil(), 8)?;
        limits.push((lo_s, hi_s));
    }

    for label in recording.channel_labels() {
        push_field(&mut out, label, 16);
    }
    for _ in 0..ns {
        push_field(&mut out, "", 80);
    }
    for _ in 0..ns {
        push_field(&mut out, "uV", 8);
    }
    for (lo, _) in &limits {
        push_field(&mut out, lo, 8);
    }
    for (_, hi) in &limits {
        push_field(&mut out, hi, 8);
    }
    for _ in 0..ns {
        push_field(&mut out, &ENCODE_DIGITAL_MIN.to_string(), 8);
    }
    for _ in 0..ns {
        push_field(&mut out, &ENCODE_DIGITAL_MAX.to_string(), 8);
    }
    for _ in 0..ns {
        push_field(&mut out, "", 80);
    }
    for _ in 0..ns {
        push_field(&mut out, &samples_per_record.to_string(), 8);
    }
    for _ in 0..ns {
        push_field(&mut out, "", 32);
    }

    let calib: Vec<(f64, f64)> = limits
        .iter()
        .map(|(lo, hi)| {
            let pmin: f64 = lo.parse().unwrap_or(-1.0);
            let pmax: f64 = hi.parse().unwrap_or(1.0);
            let dspan = f64::from(ENCODE_DIGITAL_MAX - ENCODE_DIGITAL_MIN);
            (pmin, (pmax - pmin) / dspan)
        })
        .collect();

    for rec in 0..n_records {
        for (ch, samples) in recording.channels().iter().enumerate() {
            let (pmin, gain) = calib[ch];
            let window = &samples[rec * samples_per_record..(rec + 1) * samples_per_record];
            for &v in window {
                let digital = ((v * 1e6 - pmin) / gain).round() + f64::from(ENCODE_DIGITAL_MIN);
                let digital = digital.clamp(f64::from(ENCODE_DIGITAL_MIN), f64::from(ENCODE_DIGITAL_MAX));
                out.extend_from_slice(&(digital as i16).to_le_bytes());
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_recording(sr: f64, secs: usize, channels: usize) -> Recording {
        let n = (sr as usize) * secs;
        let data = (0..channels)
            .map(|c| {
                (0..n)
                    .map(|i| {
                        let t = i as f64 / sr;
                        50e-6 * (2.0 * std::f64::consts::PI * (5.0 + c as f64) * t).sin()
                    })
                    .collect()
            })
            .collect();
        Recording::from_channels(sr, data).unwrap()
    }

    #[test]
    fn test_encode_then_decode_preserves_shape_and_amplitude() {
        let rec = sine_recording(256.0, 4, 3);
        let bytes = encode(&rec).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded.channel_count(), 3);
        assert_eq!(decoded.len(), rec.len());
        assert!((decoded.sample_rate() - 256.0).abs() < 1e-9);
        assert_eq!(decoded.channel_labels()[1], "CH2");

        // Quantization step is ~100 µV / 65535 ≈ 1.5 nV
        let max_err = rec.channels()[0]
            .iter()
            .zip(decoded.channels()[0].iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(max_err < 1e-8, "max error {max_err}");
    }

    #[test]
    fn test_non_integral_length_uses_single_record() {
        let data = vec![(0..300).map(|i| f64::from(i) * 1e-7).collect()];
        let rec = Recording::from_channels(100.0, data).unwrap();
        let bytes = encode(&rec).unwrap();
        let header = parse_header(&bytes).unwrap();
        assert_eq!(header.n_records, Some(1));
        assert_eq!(header.signals[0].samples_per_record, 300);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 300);
        assert!((decoded.sample_rate() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_edf_bytes() {
        let err = decode(b"PK\x03\x04 definitely a zip file").unwrap_err();
        assert!(matches!(err, EdfError::TooShort(_)));

        let mut junk = vec![b' '; 512];
        junk[..3].copy_from_slice(b"ABC");
        assert!(matches!(decode(&junk).unwrap_err(), EdfError::BadVersion(_)));
    }

    #[test]
    fn test_unknown_record_count_is_inferred() {
        let rec = sine_recording(128.0, 3, 2);
        let mut bytes = encode(&rec).unwrap();
        bytes[236..244].copy_from_slice(b"-1      ");
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 128 * 3);
    }

    #[test]
    fn test_truncated_payload_keeps_complete_records() {
        let rec = sine_recording(128.0, 3, 2);
        let bytes = encode(&rec).unwrap();
        let cut = bytes.len() - 10;
        let decoded = decode(&bytes[..cut]).unwrap();
        assert_eq!(decoded.len(), 128 * 2);
    }

    #[test]
    fn test_annotation_channel_is_skipped() {
        let rec = sine_recording(128.0, 2, 2);
        let mut bytes = encode(&rec).unwrap();
        // Relabel the second signal as an EDF+ annotation channel
        let label_start = HEADER_BLOCK + 16;
        bytes[label_start..label_start + 16].copy_from_slice(b"EDF Annotations ");
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.channel_count(), 1);
    }

    #[test]
    fn test_microvolt_and_millivolt_scaling() {
        let mut sig = SignalHeader {
            label: "Fp1".into(),
            physical_dimension: "uV".into(),
            physical_min: -100.0,
            physical_max: 100.0,
            digital_min: -100.0,
            digital_max: 100.0,
            samples_per_record: 1,
        };
        let (gain, offset) = sig.calibration();
        assert!((gain - 1e-6).abs() < 1e-15);
        assert!(offset.abs() < 1e-15);

        sig.physical_dimension = "mV".into();
        let (gain, _) = sig.calibration();
        assert!((gain - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn test_format_number_fits_width() {
        assert_eq!(format_number(1.0, 8).unwrap(), "1");
        assert_eq!(format_number(-3200.0, 8).unwrap(), "-3200");
        assert!(format_number(0.123456789, 8).unwrap().len() <= 8);
    }
}

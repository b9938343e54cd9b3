//! Raw-signal plot rendering
//!
//! Draws one stacked trace per channel onto an in-memory RGB bitmap and
//! PNG-encodes it. No text is drawn, so no font backend is needed.

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::prelude::*;

use crate::config::ArtifactConfig;
use crate::error::PipelineError;
use crate::types::Recording;

pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Trace colours, cycled across channels.
const PALETTE: [RGBColor; 8] = [
    RGBColor(220, 50, 50),
    RGBColor(50, 150, 50),
    RGBColor(50, 100, 220),
    RGBColor(220, 150, 50),
    RGBColor(150, 50, 220),
    RGBColor(50, 200, 200),
    RGBColor(220, 50, 150),
    RGBColor(100, 100, 100),
];

fn render_error<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::StorageUnavailable(format!("artifact rendering failed: {e}"))
}

/// Renders a recording's first seconds as a PNG.
#[derive(Debug, Clone)]
pub struct SignalRenderer {
    width: u32,
    height: u32,
    max_seconds: f64,
}

impl SignalRenderer {
    pub fn new(width: u32, height: u32, max_seconds: f64) -> Self {
        Self {
            width,
            height,
            max_seconds,
        }
    }

    pub fn from_config(config: &ArtifactConfig) -> Self {
        Self::new(config.width, config.height, config.max_seconds)
    }

    /// Render to PNG bytes. Pure; touches no I/O.
    pub fn render(&self, recording: &Recording) -> Result<Vec<u8>, PipelineError> {
        if recording.is_empty() {
            return Err(render_error("recording has no samples"));
        }
        let (w, h) = (self.width, self.height);
        let mut rgb = vec![0u8; w as usize * h as usize * 3];

        let shown = recording
            .seconds_to_samples(self.max_seconds)
            .min(recording.len())
            .max(1);
        // Roughly two points per horizontal pixel is plenty for a line plot
        let stride = (shown / (2 * w as usize).max(1)).max(1);
        let secs = shown as f64 / recording.sample_rate();

        {
            let root = BitMapBackend::with_buffer(&mut rgb, (w, h)).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;

            let lanes = root.split_evenly((recording.channel_count(), 1));
            for (ch, (lane, samples)) in lanes.iter().zip(recording.channels()).enumerate() {
                let window = &samples[..shown];
                let (lo, hi) = window
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                let (lo, hi) = if hi - lo > f64::EPSILON {
                    let pad = (hi - lo) * 0.05;
                    (lo - pad, hi + pad)
                } else {
                    (lo - 1.0, hi + 1.0)
                };

                let mut chart = ChartBuilder::on(lane)
                    .margin(2)
                    .build_cartesian_2d(0f64..secs, lo..hi)
                    .map_err(render_error)?;

                let sr = recording.sample_rate();
                chart
                    .draw_series(LineSeries::new(
                        window
                            .iter()
                            .enumerate()
                            .step_by(stride)
                            .map(|(i, v)| (i as f64 / sr, *v)),
                        ShapeStyle::from(&PALETTE[ch % PALETTE.len()]).stroke_width(1),
                    ))
                    .map_err(render_error)?;
            }

            root.present().map_err(render_error)?;
        }

        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(&rgb, w, h, ColorType::Rgb8)
            .map_err(render_error)?;
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_renders_png_bytes() {
        let data = (0..3)
            .map(|c| (0..512).map(|i| ((i + c * 7) as f64 * 0.1).sin() * 1e-5).collect())
            .collect();
        let rec = Recording::from_channels(256.0, data).unwrap();
        let png = SignalRenderer::new(320, 240, 1.0).render(&rec).unwrap();
        assert!(png.len() > PNG_MAGIC.len());
        assert_eq!(png[..8], PNG_MAGIC);
    }

    #[test]
    fn test_flat_channel_still_renders() {
        let rec = Recording::from_channels(100.0, vec![vec![0.0; 300], vec![1.0; 300]]).unwrap();
        let png = SignalRenderer::new(200, 200, 10.0).render(&rec).unwrap();
        assert_eq!(png[..8], PNG_MAGIC);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let rec = Recording::from_channels(50.0, vec![(0..500).map(f64::from).collect()]).unwrap();
        let r = SignalRenderer::new(160, 120, 2.0);
        assert_eq!(r.render(&rec).unwrap(), r.render(&rec).unwrap());
    }
}

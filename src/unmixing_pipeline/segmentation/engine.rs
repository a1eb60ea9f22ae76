use image::GrayImage;
use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::unmixing_pipeline::common::error::Result;
use crate::unmixing_pipeline::segmentation::smoothing::{normalize_to_u8, smooth, DEFAULT_BLUR_SIGMA};
use crate::unmixing_pipeline::segmentation::threshold::{HistogramOtsu, ImageprocOtsu, ThresholdMethod};

/// Threshold used when every automatic method fails.
pub const FALLBACK_THRESHOLD: u8 = 128;

/// Which rung of the threshold ladder produced the value in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "method", rename_all = "lowercase")]
pub enum ThresholdSource {
    Automatic(&'static str),
    Fixed,
}

/// Segmentation of one THb map.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// Blurred THb map scaled to 0..=255
    pub normalized: GrayImage,
    pub threshold: u8,
    pub source: ThresholdSource,
    /// `true` for lesion pixels, `[y, x]`; skin is the complement
    pub lesion: Array2<bool>,
    /// One message per failed threshold method
    pub fallback_notes: Vec<String>,
}

impl Segmentation {
    pub fn skin(&self) -> Array2<bool> {
        self.lesion.mapv(|l| !l)
    }

    pub fn lesion_pixels(&self) -> usize {
        self.lesion.iter().filter(|&&l| l).count()
    }

    pub fn skin_pixels(&self) -> usize {
        self.lesion.len() - self.lesion_pixels()
    }
}

/// Lesion mask for `threshold`: every pixel at or above it.
pub fn lesion_mask(normalized: &GrayImage, threshold: u8) -> Array2<bool> {
    let (width, height) = normalized.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        normalized.get_pixel(x as u32, y as u32)[0] >= threshold
    })
}

pub struct SegmentationEngine {
    sigma: f32,
    methods: Vec<Box<dyn ThresholdMethod>>,
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_SIGMA)
    }
}

impl SegmentationEngine {
    /// Primary `imageproc` Otsu, then the histogram Otsu.
    pub fn new(sigma: f32) -> Self {
        Self::with_methods(sigma, vec![Box::new(ImageprocOtsu), Box::new(HistogramOtsu)])
    }

    pub fn with_methods(sigma: f32, methods: Vec<Box<dyn ThresholdMethod>>) -> Self {
        Self { sigma, methods }
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    /// Blurs, normalizes and thresholds `thb`.
    ///
    /// Threshold methods are tried in order until one succeeds; if all fail
    /// [`FALLBACK_THRESHOLD`] is used. The value actually used is always
    /// reported back.
    #[instrument(skip_all, fields(sigma = self.sigma))]
    pub fn segment(&self, thb: &Array2<f64>) -> Result<Segmentation> {
        let blurred = smooth(thb, self.sigma)?;
        let normalized = normalize_to_u8(&blurred);

        let mut fallback_notes = Vec::new();
        let mut chosen = None;
        for method in &self.methods {
            match method.threshold(&normalized) {
                Ok(level) => {
                    chosen = Some((level, ThresholdSource::Automatic(method.name())));
                    break;
                }
                Err(e) => {
                    warn!(method = method.name(), "Threshold method failed: {}", e);
                    fallback_notes.push(format!("{} failed: {}", method.name(), e));
                }
            }
        }

        let (threshold, source) = match chosen {
            Some(found) => found,
            None => {
                fallback_notes.push(format!(
                    "no automatic threshold available, using {}",
                    FALLBACK_THRESHOLD
                ));
                (FALLBACK_THRESHOLD, ThresholdSource::Fixed)
            }
        };

        let lesion = lesion_mask(&normalized, threshold);
        debug!(threshold, ?source, "Segmentation complete");

        Ok(Segmentation {
            normalized,
            threshold,
            source,
            lesion,
            fallback_notes,
        })
    }
}

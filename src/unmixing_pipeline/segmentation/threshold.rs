//! Automatic threshold selection on an 8-bit normalized map.
//!
//! Every method returns the first intensity level that belongs to the bright
//! (lesion) class, so a pixel is lesion when `value >= threshold`.

use image::GrayImage;
use imageproc::contrast::otsu_level;

use crate::unmixing_pipeline::common::error::{Result, UnmixingError};

const NUM_LEVELS: usize = 256;

pub trait ThresholdMethod: Send + Sync {
    fn name(&self) -> &'static str;

    fn threshold(&self, image: &GrayImage) -> Result<u8>;
}

/// Otsu's method as implemented by `imageproc`.
pub struct ImageprocOtsu;

impl ThresholdMethod for ImageprocOtsu {
    fn name(&self) -> &'static str {
        "imageproc-otsu"
    }

    fn threshold(&self, image: &GrayImage) -> Result<u8> {
        if image.width() == 0 || image.height() == 0 {
            return Err(UnmixingError::InputError("empty image".to_string()));
        }
        // imageproc reports the last background level.
        Ok(otsu_level(image).saturating_add(1))
    }
}

/// Independent histogram-based Otsu implementation.
///
/// Fails on empty and single-valued images, where no split exists.
pub struct HistogramOtsu;

impl HistogramOtsu {
    fn histogram(image: &GrayImage) -> [u64; NUM_LEVELS] {
        let mut histogram = [0u64; NUM_LEVELS];
        for pixel in image.pixels() {
            histogram[pixel[0] as usize] += 1;
        }
        histogram
    }
}

impl ThresholdMethod for HistogramOtsu {
    fn name(&self) -> &'static str {
        "histogram-otsu"
    }

    fn threshold(&self, image: &GrayImage) -> Result<u8> {
        let histogram = Self::histogram(image);
        let total: u64 = histogram.iter().sum();
        if total == 0 {
            return Err(UnmixingError::InputError("empty image".to_string()));
        }

        let total = total as f64;
        let global_sum: f64 = histogram
            .iter()
            .enumerate()
            .map(|(level, &count)| level as f64 * count as f64)
            .sum();

        let mut background_weight = 0.0;
        let mut background_sum = 0.0;
        let mut best: Option<(f64, usize)> = None;

        for level in 0..NUM_LEVELS - 1 {
            background_weight += histogram[level] as f64;
            background_sum += level as f64 * histogram[level] as f64;
            let foreground_weight = total - background_weight;
            if background_weight == 0.0 || foreground_weight == 0.0 {
                continue;
            }

            let background_mean = background_sum / background_weight;
            let foreground_mean = (global_sum - background_sum) / foreground_weight;
            let diff = background_mean - foreground_mean;
            let variance = background_weight * foreground_weight * diff * diff;

            if best.is_none_or(|(best_variance, _)| variance > best_variance) {
                best = Some((variance, level));
            }
        }

        match best {
            Some((_, level)) => Ok((level + 1) as u8),
            None => Err(UnmixingError::InputError(
                "single-valued image has no Otsu split".to_string(),
            )),
        }
    }
}

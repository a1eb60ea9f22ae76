use ndarray::Array2;
use serde::Serialize;

use crate::unmixing_pipeline::common::error::{Result, UnmixingError};

/// Mean skin THb at or below which the S-coefficient is reported as 0.0.
pub const S_COEFFICIENT_MIN_SKIN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegionStatistics {
    /// Mean THb over lesion pixels, 0.0 for an empty lesion
    pub mean_lesion_thb: f64,
    /// Mean THb over skin pixels, 0.0 for an empty skin region
    pub mean_skin_thb: f64,
    pub lesion_pixels: usize,
    pub skin_pixels: usize,
    pub s_coefficient: f64,
}

/// Lesion to skin contrast. Never NaN or infinite for finite means.
pub fn s_coefficient(mean_lesion: f64, mean_skin: f64) -> f64 {
    if mean_skin > S_COEFFICIENT_MIN_SKIN {
        mean_lesion / mean_skin
    } else {
        0.0
    }
}

/// Region means of `thb` under `lesion` and its complement.
pub fn compute_statistics(thb: &Array2<f64>, lesion: &Array2<bool>) -> Result<RegionStatistics> {
    if thb.dim() != lesion.dim() {
        return Err(UnmixingError::InputError(format!(
            "THb map is {:?} but mask is {:?}",
            thb.dim(),
            lesion.dim()
        )));
    }

    let (mut lesion_sum, mut lesion_pixels) = (0.0, 0usize);
    let (mut skin_sum, mut skin_pixels) = (0.0, 0usize);
    for (&value, &is_lesion) in thb.iter().zip(lesion.iter()) {
        if is_lesion {
            lesion_sum += value;
            lesion_pixels += 1;
        } else {
            skin_sum += value;
            skin_pixels += 1;
        }
    }

    let mean = |sum: f64, count: usize| if count > 0 { sum / count as f64 } else { 0.0 };
    let mean_lesion_thb = mean(lesion_sum, lesion_pixels);
    let mean_skin_thb = mean(skin_sum, skin_pixels);

    Ok(RegionStatistics {
        mean_lesion_thb,
        mean_skin_thb,
        lesion_pixels,
        skin_pixels,
        s_coefficient: s_coefficient(mean_lesion_thb, mean_skin_thb),
    })
}

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use ndarray::Array2;

use crate::unmixing_pipeline::common::error::{Result, UnmixingError};

/// Gaussian sigma applied to the THb map before thresholding.
pub const DEFAULT_BLUR_SIGMA: f32 = 2.0;

/// Added to the value range so a flat map normalizes to zero instead of NaN.
pub const NORMALIZE_EPSILON: f64 = 1e-8;

/// Gaussian-blurs a `[y, x]` map. A sigma of zero returns the map unchanged.
pub fn smooth(map: &Array2<f64>, sigma: f32) -> Result<Array2<f64>> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(UnmixingError::ConfigError(format!(
            "blur sigma must be finite and non-negative, got {}",
            sigma
        )));
    }
    if sigma == 0.0 || map.is_empty() {
        return Ok(map.clone());
    }

    let (height, width) = map.dim();
    let image: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
            Luma([map[[y as usize, x as usize]] as f32])
        });
    let blurred = gaussian_blur_f32(&image, sigma);
    Ok(Array2::from_shape_fn((height, width), |(y, x)| {
        f64::from(blurred.get_pixel(x as u32, y as u32)[0])
    }))
}

/// Spreads narrower than this, relative to the map's magnitude, are rounding
/// noise from the single-precision blur.
const FLAT_RELATIVE_SPREAD: f64 = 16.0 * f32::EPSILON as f64;

/// Min-max scales finite values of `map` onto 0..=255, truncating to integers.
///
/// `(v - min) / (max - min + NORMALIZE_EPSILON) * 255`. Non-finite values map
/// to 0, and so does every pixel of a map that is flat up to blur precision.
pub fn normalize_to_u8(map: &Array2<f64>) -> GrayImage {
    let (height, width) = map.dim();
    let (min, max) = finite_range(map).unwrap_or((0.0, 0.0));
    if max - min <= FLAT_RELATIVE_SPREAD * min.abs().max(max.abs()) {
        return GrayImage::new(width as u32, height as u32);
    }
    let range = max - min + NORMALIZE_EPSILON;
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let v = map[[y as usize, x as usize]];
        let scaled = if v.is_finite() {
            (v - min) / range * 255.0
        } else {
            0.0
        };
        // `as` saturates, matching a truncating cast to an 8-bit integer.
        Luma([scaled as u8])
    })
}

/// Smallest and largest finite value, `None` if there are none.
pub fn finite_range(map: &Array2<f64>) -> Option<(f64, f64)> {
    map.iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

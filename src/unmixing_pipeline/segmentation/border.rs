//! Lesion border profile.
//!
//! Sweeps the normalized map from the segmentation threshold up to full
//! scale, one intensity level at a time. Each level contributes the band of
//! pixels sitting exactly one level above it and the area of everything
//! above it, which together describe how sharply the lesion rises out of the
//! surrounding skin.

use std::f64::consts::PI;

use image::GrayImage;
use ndarray::Array2;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorderLevel {
    pub level: u8,
    /// Mean normalized value of the band `(level, level + 1]`
    pub band_mean: f64,
    /// Population standard deviation of the same band
    pub band_std: f64,
    pub band_pixels: usize,
    /// Pixels strictly above `level`
    pub region_area: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorderProfile {
    pub levels: Vec<BorderLevel>,
    /// Mean normalized value of non-zero skin pixels
    pub skin_level: Option<f64>,
    /// `-mean(Δ(band_mean / skin_level) / Δ(sqrt(area / 4π)))` over finite terms
    pub gradient: Option<f64>,
}

fn histogram(normalized: &GrayImage) -> [usize; 256] {
    let mut histogram = [0usize; 256];
    for pixel in normalized.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    histogram
}

/// Computes the border profile above `threshold`.
///
/// Levels whose band is empty repeat the previous level's band statistics;
/// levels before the first non-empty band are skipped.
pub fn border_profile(normalized: &GrayImage, threshold: u8, lesion: &Array2<bool>) -> BorderProfile {
    let histogram = histogram(normalized);

    let mut levels: Vec<BorderLevel> = Vec::new();
    for level in threshold.saturating_sub(1)..u8::MAX {
        let band_value = level as usize + 1;
        let band_pixels = histogram[band_value];
        let region_area: usize = histogram[band_value..].iter().sum();

        // Every pixel in the band holds the same integer value.
        let entry = if band_pixels > 0 {
            BorderLevel {
                level,
                band_mean: band_value as f64,
                band_std: 0.0,
                band_pixels,
                region_area,
            }
        } else if let Some(previous) = levels.last() {
            BorderLevel {
                level,
                region_area,
                ..previous.clone()
            }
        } else {
            continue;
        };
        levels.push(entry);
    }

    let skin_level = skin_level(normalized, lesion);
    let gradient = skin_level.and_then(|skin| border_gradient(&levels, skin));

    BorderProfile {
        levels,
        skin_level,
        gradient,
    }
}

fn skin_level(normalized: &GrayImage, lesion: &Array2<bool>) -> Option<f64> {
    let (sum, count) = normalized
        .enumerate_pixels()
        .filter(|(x, y, p)| {
            let is_lesion = lesion.get([*y as usize, *x as usize]).copied().unwrap_or(true);
            !is_lesion && p[0] != 0
        })
        .fold((0.0, 0usize), |(sum, count), (_, _, p)| (sum + p[0] as f64, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn border_gradient(levels: &[BorderLevel], skin: f64) -> Option<f64> {
    let terms: Vec<f64> = levels
        .windows(2)
        .filter_map(|pair| {
            let ratio_step = pair[1].band_mean / skin - pair[0].band_mean / skin;
            let radius = |area: usize| (area as f64 / 4.0 / PI).sqrt();
            let radius_step = radius(pair[1].region_area) - radius(pair[0].region_area);
            let term = ratio_step / radius_step;
            term.is_finite().then_some(term)
        })
        .collect();
    if terms.is_empty() {
        return None;
    }
    Some(-terms.iter().sum::<f64>() / terms.len() as f64)
}

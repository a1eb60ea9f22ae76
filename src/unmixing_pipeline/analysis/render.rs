//! Raster rendering for saved artifacts.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::drawing::draw_line_segment_mut;
use ndarray::{Array2, ArrayView2};

use crate::unmixing_pipeline::segmentation::normalize_to_u8;

pub const CONTOUR_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Min-max scales one concentration map onto 0..=255.
pub fn render_map(map: ArrayView2<'_, f64>) -> GrayImage {
    normalize_to_u8(&map.to_owned())
}

/// Lesion pixels white, skin black.
pub fn render_mask(lesion: &Array2<bool>) -> GrayImage {
    let (height, width) = lesion.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if lesion[[y as usize, x as usize]] {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Draws the lesion outlines over the normalized THb map.
pub fn render_contours(normalized: &GrayImage, lesion: &Array2<bool>) -> RgbImage {
    let mut overlay = RgbImage::from_fn(normalized.width(), normalized.height(), |x, y| {
        let v = normalized.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });

    for contour in find_contours::<i32>(&render_mask(lesion)) {
        let points = &contour.points;
        let Some(first) = points.first() else {
            continue;
        };
        if points.len() == 1 {
            overlay.put_pixel(first.x as u32, first.y as u32, CONTOUR_COLOR);
            continue;
        }
        for (start, end) in points.iter().zip(points.iter().cycle().skip(1)) {
            draw_line_segment_mut(
                &mut overlay,
                (start.x as f32, start.y as f32),
                (end.x as f32, end.y as f32),
                CONTOUR_COLOR,
            );
        }
    }
    overlay
}

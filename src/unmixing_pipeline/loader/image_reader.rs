//! Wavelength image reader implementation using the `image` crate.
//!
//! Any format the `image` crate can decode is accepted (PNG, TIFF, BMP, JPEG).
//! Multi-channel captures are reduced to a single luma channel before they
//! are stacked.

use image::DynamicImage;
use ndarray::Array2;
use tracing::debug;

use crate::unmixing_pipeline::common::error::{Result, UnmixingError};
use crate::unmixing_pipeline::loader::reader::WavelengthImageReader;
use crate::unmixing_pipeline::loader::types::ImageSource;

/// Reader that decodes captures with the `image` crate.
pub struct ImageCrateReader;

impl WavelengthImageReader for ImageCrateReader {
    /// Reads and decodes one capture.
    ///
    /// 8-bit grayscale data is used as is. Anything else (RGB, 16-bit) goes
    /// through `to_luma8`, which lands on the same 0..=255 scale the optical
    /// density transform expects.
    ///
    /// # Errors
    ///
    /// * `InputReadError` - the file could not be read
    /// * `DecodeError` - the bytes are not a supported raster
    fn read_gray(&self, source: &ImageSource) -> Result<Array2<f64>> {
        let decoded = match source {
            ImageSource::Path(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    UnmixingError::InputReadError(format!("{}: {}", path.display(), e))
                })?;
                image::load_from_memory(&bytes)
            }
            ImageSource::Bytes(bytes) => image::load_from_memory(bytes),
        }
        .map_err(|e| UnmixingError::DecodeError(format!("{}: {}", source, e)))?;

        debug!(
            "Decoded {}: {}x{} {:?}",
            source,
            decoded.width(),
            decoded.height(),
            decoded.color()
        );

        let gray = match decoded {
            DynamicImage::ImageLuma8(gray) => gray,
            other => other.to_luma8(),
        };

        let (width, height) = gray.dimensions();
        let data: Vec<f64> = gray.into_raw().into_iter().map(f64::from).collect();
        Array2::from_shape_vec((height as usize, width as usize), data)
            .map_err(|e| UnmixingError::DecodeError(format!("{}: {}", source, e)))
    }
}

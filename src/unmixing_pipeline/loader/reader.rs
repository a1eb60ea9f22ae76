use ndarray::Array2;

use crate::unmixing_pipeline::common::error::Result;
use crate::unmixing_pipeline::loader::types::ImageSource;

pub trait WavelengthImageReader {
    /// Decodes `source` to a single-channel `[y, x]` raster with values in 0..=255.
    fn read_gray(&self, source: &ImageSource) -> Result<Array2<f64>>;
}

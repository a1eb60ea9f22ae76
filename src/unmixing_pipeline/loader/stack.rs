use ndarray::{stack, ArrayView2, Axis};
use tracing::{debug, instrument};

use crate::unmixing_pipeline::common::error::{Result, UnmixingError};
use crate::unmixing_pipeline::loader::reader::WavelengthImageReader;
use crate::unmixing_pipeline::loader::types::{Hypercube, WavelengthImage, WavelengthSource};

/// Decodes every source and stacks the images into a hypercube.
///
/// Channels are ordered by ascending wavelength whatever order the sources
/// arrive in, so channel `i` always lines up with overlap-matrix row `i`.
#[instrument(skip_all, fields(images = sources.len()))]
pub fn load_hypercube<R: WavelengthImageReader + ?Sized>(
    reader: &R,
    sources: &[WavelengthSource],
) -> Result<Hypercube> {
    if sources.is_empty() {
        return Err(UnmixingError::InputError("no images".to_string()));
    }

    let mut ordered: Vec<&WavelengthSource> = sources.iter().collect();
    ordered.sort_by_key(|s| s.wavelength_nm);
    if let Some(pair) = ordered
        .windows(2)
        .find(|pair| pair[0].wavelength_nm == pair[1].wavelength_nm)
    {
        return Err(UnmixingError::InputError(format!(
            "duplicate wavelength {} nm: only one capture per wavelength is accepted",
            pair[0].wavelength_nm
        )));
    }

    let mut images: Vec<WavelengthImage> = Vec::with_capacity(ordered.len());
    for entry in ordered {
        let pixels = reader.read_gray(&entry.source)?;
        debug!(
            wavelength_nm = entry.wavelength_nm,
            "Loaded {}x{} image",
            pixels.ncols(),
            pixels.nrows()
        );
        let image = WavelengthImage {
            wavelength_nm: entry.wavelength_nm,
            pixels,
        };
        if let Some(first) = images.first() {
            if first.pixels.dim() != image.pixels.dim() {
                return Err(UnmixingError::InputError(format!(
                    "size mismatch: {} nm is {}x{}, {} nm is {}x{}",
                    first.wavelength_nm,
                    first.width(),
                    first.height(),
                    image.wavelength_nm,
                    image.width(),
                    image.height()
                )));
            }
        }
        images.push(image);
    }

    stack_images(&images)
}

/// Stacks already decoded images. They must be sorted by wavelength and share
/// one size.
pub fn stack_images(images: &[WavelengthImage]) -> Result<Hypercube> {
    let views: Vec<ArrayView2<'_, f64>> = images.iter().map(|i| i.pixels.view()).collect();
    let data = stack(Axis(0), &views)
        .map_err(|e| UnmixingError::InputError(format!("size mismatch: {}", e)))?;
    let wavelengths = images.iter().map(|i| i.wavelength_nm).collect();
    Hypercube::new(wavelengths, data)
}

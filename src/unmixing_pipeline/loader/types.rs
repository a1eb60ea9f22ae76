//! Wavelength image and hypercube types

use std::fmt;
use std::path::PathBuf;

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::unmixing_pipeline::common::error::{Result, UnmixingError};

/// Where a raw image comes from. Sources are only ever read.
#[derive(Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Path(path) => write!(f, "Path({})", path.display()),
            ImageSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Path(path) => write!(f, "{}", path.display()),
            ImageSource::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// One raw capture tagged with its illumination wavelength.
#[derive(Debug, Clone)]
pub struct WavelengthSource {
    pub wavelength_nm: u32,
    pub source: ImageSource,
}

impl WavelengthSource {
    pub fn path(wavelength_nm: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            wavelength_nm,
            source: ImageSource::Path(path.into()),
        }
    }

    pub fn bytes(wavelength_nm: u32, bytes: Vec<u8>) -> Self {
        Self {
            wavelength_nm,
            source: ImageSource::Bytes(bytes),
        }
    }
}

/// Decoded single-channel raster, intensities in 0..=255.
#[derive(Debug, Clone)]
pub struct WavelengthImage {
    pub wavelength_nm: u32,
    /// Pixel data indexed `[y, x]`
    pub pixels: Array2<f64>,
}

impl WavelengthImage {
    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }
}

/// Rectangular region of interest in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl std::str::FromStr for Roi {
    type Err = UnmixingError;

    /// Parses `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<usize> = s
            .split(',')
            .map(|p| p.trim().parse::<usize>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| UnmixingError::InputError(format!("invalid roi '{}': {}", s, e)))?;
        match parts.as_slice() {
            [x, y, width, height] => Ok(Roi {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            _ => Err(UnmixingError::InputError(format!(
                "invalid roi '{}': expected x,y,width,height",
                s
            ))),
        }
    }
}

/// Stack of wavelength images, `channels × height × width`, channels in
/// ascending wavelength order.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypercube {
    wavelengths: Vec<u32>,
    data: Array3<f64>,
}

impl Hypercube {
    pub fn new(wavelengths: Vec<u32>, data: Array3<f64>) -> Result<Self> {
        if wavelengths.len() != data.len_of(Axis(0)) {
            return Err(UnmixingError::InputError(format!(
                "{} wavelengths for {} channels",
                wavelengths.len(),
                data.len_of(Axis(0))
            )));
        }
        if wavelengths.windows(2).any(|w| w[0] >= w[1]) {
            return Err(UnmixingError::InputError(
                "wavelengths must be strictly ascending".to_string(),
            ));
        }
        Ok(Self { wavelengths, data })
    }

    pub fn wavelengths(&self) -> &[u32] {
        &self.wavelengths
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn channel(&self, index: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), index)
    }

    /// Crops every channel to `roi`.
    pub fn crop(&self, roi: &Roi) -> Result<Hypercube> {
        let right = roi.x.checked_add(roi.width);
        let bottom = roi.y.checked_add(roi.height);
        let fits = roi.width > 0
            && roi.height > 0
            && right.is_some_and(|r| r <= self.width())
            && bottom.is_some_and(|b| b <= self.height());
        if !fits {
            return Err(UnmixingError::InputError(format!(
                "roi {:?} outside {}x{} image",
                roi,
                self.width(),
                self.height()
            )));
        }
        let data = self
            .data
            .slice(s![.., roi.y..roi.y + roi.height, roi.x..roi.x + roi.width])
            .to_owned();
        Ok(Hypercube {
            wavelengths: self.wavelengths.clone(),
            data,
        })
    }
}

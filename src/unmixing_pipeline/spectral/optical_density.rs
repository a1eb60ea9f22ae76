use ndarray::{Array3, Zip};

use crate::unmixing_pipeline::common::error::{Result, UnmixingError};
use crate::unmixing_pipeline::loader::Hypercube;

/// Full-scale intensity of an 8-bit capture.
pub const FULL_SCALE_INTENSITY: f64 = 255.0;

/// Lower clamp on the reflectance ratio so `log10` never sees zero.
pub const OD_EPSILON: f64 = 1e-6;

/// `-log10(clamp(ratio, OD_EPSILON, 1))`. Total: NaN ratios are treated as
/// fully absorbed.
pub fn optical_density_from_ratio(ratio: f64) -> f64 {
    let clamped = if ratio.is_nan() {
        OD_EPSILON
    } else {
        ratio.clamp(OD_EPSILON, 1.0)
    };
    -clamped.log10()
}

/// Optical density of a raw 8-bit intensity.
pub fn optical_density(intensity: f64) -> f64 {
    optical_density_from_ratio(intensity / FULL_SCALE_INTENSITY)
}

/// Optical density per channel and pixel, same shape as the hypercube it was
/// derived from. Finite everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct OpticalDensityCube {
    wavelengths: Vec<u32>,
    data: Array3<f64>,
}

impl OpticalDensityCube {
    pub fn from_hypercube(cube: &Hypercube) -> Self {
        Self {
            wavelengths: cube.wavelengths().to_vec(),
            data: cube.data().mapv(optical_density),
        }
    }

    /// Uses a white-reference capture per wavelength instead of the fixed
    /// 8-bit full scale. A zero reference pixel yields the clamp floor.
    pub fn from_reference(cube: &Hypercube, reference: &Hypercube) -> Result<Self> {
        if cube.wavelengths() != reference.wavelengths() {
            return Err(UnmixingError::InputError(format!(
                "reference wavelengths {:?} do not match sample wavelengths {:?}",
                reference.wavelengths(),
                cube.wavelengths()
            )));
        }
        if cube.data().dim() != reference.data().dim() {
            return Err(UnmixingError::InputError(format!(
                "reference size mismatch: {:?} vs {:?}",
                reference.data().dim(),
                cube.data().dim()
            )));
        }
        let data = Zip::from(cube.data())
            .and(reference.data())
            .map_collect(|&sample, &white| {
                let ratio = if white > 0.0 { sample / white } else { 0.0 };
                optical_density_from_ratio(ratio)
            });
        Ok(Self {
            wavelengths: cube.wavelengths().to_vec(),
            data,
        })
    }

    /// Wraps precomputed optical densities, `channels × height × width`.
    pub fn from_array(wavelengths: Vec<u32>, data: Array3<f64>) -> Result<Self> {
        if wavelengths.len() != data.dim().0 {
            return Err(UnmixingError::InputError(format!(
                "{} wavelengths for {} channels",
                wavelengths.len(),
                data.dim().0
            )));
        }
        Ok(Self { wavelengths, data })
    }

    pub fn wavelengths(&self) -> &[u32] {
        &self.wavelengths
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<f64> {
        &mut self.data
    }

    pub fn channels(&self) -> usize {
        self.data.dim().0
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }
}

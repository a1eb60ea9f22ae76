use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::unmixing_pipeline::calibration::store::CalibrationStore;
use crate::unmixing_pipeline::calibration::types::{Chromophore, MissingCoefficient};
use crate::unmixing_pipeline::common::error::{Result, UnmixingError};

/// Spectral overlap matrix, one row per wavelength (ascending) and one column
/// per chromophore (ascending id). Never mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapMatrix {
    matrix: DMatrix<f64>,
    wavelengths: Vec<u32>,
    symbols: Vec<String>,
    missing: Vec<MissingCoefficient>,
    scale: Option<f64>,
}

impl OverlapMatrix {
    /// Looks up every (wavelength, chromophore) coefficient in `store`.
    ///
    /// Missing pairs become 0.0 and are listed in [`OverlapMatrix::missing`].
    /// With `normalize` the whole matrix is divided by its largest absolute
    /// entry; rows are never scaled individually.
    pub fn build<S: CalibrationStore + ?Sized>(
        wavelengths: &[u32],
        chromophores: &[Chromophore],
        store: &S,
        normalize: bool,
    ) -> Result<Self> {
        if chromophores.is_empty() {
            return Err(UnmixingError::ConfigError("no chromophores".to_string()));
        }
        if wavelengths.is_empty() {
            return Err(UnmixingError::InputError("no images".to_string()));
        }

        let mut missing = Vec::new();
        let matrix = DMatrix::from_fn(wavelengths.len(), chromophores.len(), |i, j| {
            let chromophore = &chromophores[j];
            match store.coefficient(wavelengths[i], chromophore.id) {
                Some(value) => value,
                None => {
                    warn!(
                        "Coefficient for {}nm / {} not found, using 0.0",
                        wavelengths[i], chromophore.symbol
                    );
                    missing.push(MissingCoefficient {
                        wavelength_nm: wavelengths[i],
                        chromophore_id: chromophore.id,
                        symbol: chromophore.symbol.clone(),
                    });
                    0.0
                }
            }
        });
        missing.sort_by_key(|m| (m.wavelength_nm, m.chromophore_id));

        let mut overlap = Self {
            matrix,
            wavelengths: wavelengths.to_vec(),
            symbols: chromophores.iter().map(|c| c.symbol.clone()).collect(),
            missing,
            scale: None,
        };
        if normalize {
            overlap.normalize();
        }
        debug!(
            rows = overlap.rows(),
            cols = overlap.cols(),
            missing = overlap.missing.len(),
            "Overlap matrix built"
        );
        Ok(overlap)
    }

    /// Wraps an already assembled matrix. Row count must match `wavelengths`.
    pub fn from_matrix(matrix: DMatrix<f64>, wavelengths: Vec<u32>, symbols: Vec<String>) -> Result<Self> {
        if symbols.is_empty() || matrix.ncols() == 0 {
            return Err(UnmixingError::ConfigError("no chromophores".to_string()));
        }
        if matrix.nrows() != wavelengths.len() || matrix.ncols() != symbols.len() {
            return Err(UnmixingError::ConfigError(format!(
                "overlap matrix is {}x{} for {} wavelengths and {} chromophores",
                matrix.nrows(),
                matrix.ncols(),
                wavelengths.len(),
                symbols.len()
            )));
        }
        Ok(Self {
            matrix,
            wavelengths,
            symbols,
            missing: Vec::new(),
            scale: None,
        })
    }

    fn normalize(&mut self) {
        let max_abs = self.matrix.amax();
        if max_abs > 0.0 && max_abs.is_finite() {
            self.matrix /= max_abs;
            self.scale = Some(max_abs);
        }
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn rows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn cols(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn wavelengths(&self) -> &[u32] {
        &self.wavelengths
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn missing(&self) -> &[MissingCoefficient] {
        &self.missing
    }

    /// The divisor applied by normalization, if any.
    pub fn scale(&self) -> Option<f64> {
        self.scale
    }
}

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::unmixing_pipeline::calibration::types::{Chromophore, CoefficientEntry};
use crate::unmixing_pipeline::common::error::{Result, UnmixingError};

/// Read-only lookup of calibrated overlap coefficients.
pub trait CalibrationStore {
    fn coefficient(&self, wavelength_nm: u32, chromophore_id: u32) -> Option<f64>;
}

impl<F> CalibrationStore for F
where
    F: Fn(u32, u32) -> Option<f64>,
{
    fn coefficient(&self, wavelength_nm: u32, chromophore_id: u32) -> Option<f64> {
        self(wavelength_nm, chromophore_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCalibration {
    coefficients: HashMap<(u32, u32), f64>,
}

impl InMemoryCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, wavelength_nm: u32, chromophore_id: u32, coefficient: f64) {
        self.coefficients
            .insert((wavelength_nm, chromophore_id), coefficient);
    }

    pub fn with(mut self, wavelength_nm: u32, chromophore_id: u32, coefficient: f64) -> Self {
        self.insert(wavelength_nm, chromophore_id, coefficient);
        self
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

impl CalibrationStore for InMemoryCalibration {
    fn coefficient(&self, wavelength_nm: u32, chromophore_id: u32) -> Option<f64> {
        self.coefficients
            .get(&(wavelength_nm, chromophore_id))
            .copied()
    }
}

impl FromIterator<CoefficientEntry> for InMemoryCalibration {
    fn from_iter<I: IntoIterator<Item = CoefficientEntry>>(iter: I) -> Self {
        let mut store = InMemoryCalibration::new();
        for entry in iter {
            store.insert(entry.wavelength_nm, entry.chromophore_id, entry.coefficient);
        }
        store
    }
}

/// On-disk calibration: the chromophore list plus every known coefficient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub chromophores: Vec<Chromophore>,
    #[serde(default)]
    pub coefficients: Vec<CoefficientEntry>,
}

impl CalibrationFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            UnmixingError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        let file: CalibrationFile = serde_json::from_str(&text).map_err(|e| {
            UnmixingError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        debug!(
            chromophores = file.chromophores.len(),
            coefficients = file.coefficients.len(),
            "Loaded calibration from {}",
            path.display()
        );
        Ok(file)
    }

    /// Chromophores in stable (ascending id) order.
    pub fn sorted_chromophores(&self) -> Vec<Chromophore> {
        let mut chromophores = self.chromophores.clone();
        chromophores.sort_by_key(|c| c.id);
        chromophores
    }

    pub fn store(&self) -> InMemoryCalibration {
        self.coefficients.iter().cloned().collect()
    }
}

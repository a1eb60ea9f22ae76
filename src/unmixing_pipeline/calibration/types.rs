//! Calibration data types

use serde::{Deserialize, Serialize};

/// A light absorber resolved by the unmixing, e.g. `HbO2`, `Hb` or `Melanin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chromophore {
    /// Stable identifier; chromophores are always processed in ascending id order
    pub id: u32,
    /// Short symbol used for THb selection and artifact file names
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Chromophore {
    pub fn new(id: u32, symbol: impl Into<String>) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            description: None,
        }
    }
}

/// One calibrated spectral overlap coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientEntry {
    pub wavelength_nm: u32,
    pub chromophore_id: u32,
    pub coefficient: f64,
}

/// A calibration pair that had no stored coefficient and was filled with 0.0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingCoefficient {
    pub wavelength_nm: u32,
    pub chromophore_id: u32,
    pub symbol: String,
}

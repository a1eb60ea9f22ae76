//! Calibration module
//!
//! Chromophore definitions, the coefficient store seam and the overlap
//! matrix assembled from them.

mod overlap;
mod store;
pub mod types;


pub use overlap::OverlapMatrix;
pub use store::{CalibrationFile, CalibrationStore, InMemoryCalibration};
pub use types::{Chromophore, CoefficientEntry, MissingCoefficient};

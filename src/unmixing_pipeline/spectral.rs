//! Spectral unmixing module
//!
//! Optical density transform and the per-pixel Beer-Lambert inversion.

mod optical_density;
mod solver;
mod unmix;


pub use optical_density::{
    optical_density, optical_density_from_ratio, OpticalDensityCube, FULL_SCALE_INTENSITY,
    OD_EPSILON,
};
pub use solver::{build_solver, LeastSquaresSolver, PixelSolver, QrSolver, SolverStrategy};
pub use unmix::{unmix, ConcentrationMaps, UnmixOutcome};

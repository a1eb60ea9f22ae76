//! Per-pixel linear solvers for `A · c ≈ od`.
//!
//! Both solvers factor the overlap matrix once at construction; the per-pixel
//! work is a matrix-vector product (least squares) or a matrix-vector product
//! plus back-substitution (QR). Solvers hold no mutable state, so pixels can
//! be solved in any order and on any thread.

use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::unmixing_pipeline::calibration::OverlapMatrix;
use crate::unmixing_pipeline::common::error::{Result, UnmixingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverStrategy {
    /// Minimum-norm least squares via the SVD pseudo-inverse. Works for any
    /// matrix shape and rank.
    #[default]
    #[serde(rename = "lstsq", alias = "least-squares")]
    LeastSquares,
    /// Thin QR factorization with per-pixel back-substitution. Needs at
    /// least as many wavelengths as chromophores.
    Qr,
}

impl fmt::Display for SolverStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverStrategy::LeastSquares => f.write_str("lstsq"),
            SolverStrategy::Qr => f.write_str("qr"),
        }
    }
}

impl FromStr for SolverStrategy {
    type Err = UnmixingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lstsq" | "least-squares" | "leastsquares" => Ok(SolverStrategy::LeastSquares),
            "qr" => Ok(SolverStrategy::Qr),
            other => Err(UnmixingError::ConfigError(format!("unknown solver '{}'", other))),
        }
    }
}

pub trait PixelSolver: Send + Sync {
    /// Number of wavelengths (length of an optical density vector).
    fn rows(&self) -> usize;

    /// Number of chromophores (length of a concentration vector).
    fn unknowns(&self) -> usize;

    /// Solves one pixel. `None` marks a numerical failure for that pixel only.
    fn solve(&self, od: &DVector<f64>) -> Option<DVector<f64>>;
}

/// Builds the solver for `strategy`.
pub fn build_solver(strategy: SolverStrategy, overlap: &OverlapMatrix) -> Result<Box<dyn PixelSolver>> {
    match strategy {
        SolverStrategy::LeastSquares => Ok(Box::new(LeastSquaresSolver::new(overlap.matrix())?)),
        SolverStrategy::Qr => Ok(Box::new(QrSolver::new(overlap.matrix())?)),
    }
}

fn finite(solution: DVector<f64>) -> Option<DVector<f64>> {
    solution.iter().all(|v| v.is_finite()).then_some(solution)
}

pub struct LeastSquaresSolver {
    pseudo_inverse: DMatrix<f64>,
}

impl LeastSquaresSolver {
    pub fn new(a: &DMatrix<f64>) -> Result<Self> {
        let (rows, cols) = a.shape();
        if cols == 0 {
            return Err(UnmixingError::ConfigError("no chromophores".to_string()));
        }
        let svd = a.clone().svd(true, true);
        let largest = svd.singular_values.max();
        // Standard rank tolerance: eps * max(rows, cols) * largest singular value.
        let cutoff = f64::EPSILON * rows.max(cols) as f64 * largest;
        debug!(rows, cols, largest, cutoff, "Least squares solver factored");
        let pseudo_inverse = svd
            .pseudo_inverse(cutoff)
            .map_err(|e| UnmixingError::ConfigError(format!("pseudo-inverse failed: {}", e)))?;
        Ok(Self { pseudo_inverse })
    }
}

impl PixelSolver for LeastSquaresSolver {
    fn rows(&self) -> usize {
        self.pseudo_inverse.ncols()
    }

    fn unknowns(&self) -> usize {
        self.pseudo_inverse.nrows()
    }

    fn solve(&self, od: &DVector<f64>) -> Option<DVector<f64>> {
        if od.len() != self.rows() {
            return None;
        }
        finite(&self.pseudo_inverse * od)
    }
}

pub struct QrSolver {
    r: DMatrix<f64>,
    q_t: DMatrix<f64>,
}

impl QrSolver {
    pub fn new(a: &DMatrix<f64>) -> Result<Self> {
        let (rows, cols) = a.shape();
        if cols == 0 {
            return Err(UnmixingError::ConfigError("no chromophores".to_string()));
        }
        if rows < cols {
            return Err(UnmixingError::ConfigError(format!(
                "QR solver needs at least as many wavelengths as chromophores ({} < {})",
                rows, cols
            )));
        }
        // Thin factorization: Q is rows×cols and R is cols×cols, i.e. the
        // leading `cols` rows of the complete R and of Qᵀ.
        let qr = a.clone().qr();
        let r = qr.r();
        let q_t = qr.q().transpose();
        debug!(rows, cols, "QR solver factored");
        Ok(Self { r, q_t })
    }
}

impl PixelSolver for QrSolver {
    fn rows(&self) -> usize {
        self.q_t.ncols()
    }

    fn unknowns(&self) -> usize {
        self.r.ncols()
    }

    fn solve(&self, od: &DVector<f64>) -> Option<DVector<f64>> {
        if od.len() != self.rows() {
            return None;
        }
        let rhs = &self.q_t * od;
        self.r.solve_upper_triangular(&rhs).and_then(finite)
    }
}

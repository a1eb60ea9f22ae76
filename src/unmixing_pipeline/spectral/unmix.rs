use nalgebra::DVector;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use crate::unmixing_pipeline::common::error::{Result, UnmixingError};
use crate::unmixing_pipeline::spectral::optical_density::OpticalDensityCube;
use crate::unmixing_pipeline::spectral::solver::PixelSolver;

/// Per-chromophore concentration, `chromophores × height × width`, in the
/// same chromophore order as the overlap matrix columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcentrationMaps {
    symbols: Vec<String>,
    data: Array3<f64>,
}

impl ConcentrationMaps {
    pub fn new(symbols: Vec<String>, data: Array3<f64>) -> Result<Self> {
        if symbols.len() != data.len_of(Axis(0)) {
            return Err(UnmixingError::ConfigError(format!(
                "{} chromophore symbols for {} maps",
                symbols.len(),
                data.len_of(Axis(0))
            )));
        }
        Ok(Self { symbols, data })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn map(&self, index: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), index)
    }

    /// Element-wise absolute value of one map.
    pub fn abs_map(&self, index: usize) -> Array2<f64> {
        self.map(index).mapv(f64::abs)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ArrayView2<'_, f64>)> {
        self.symbols
            .iter()
            .map(String::as_str)
            .zip(self.data.axis_iter(Axis(0)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnmixOutcome {
    pub maps: ConcentrationMaps,
    /// Pixels whose solve failed and were left at zero concentration
    pub failed_pixels: usize,
}

/// Solves every pixel of `od` independently.
///
/// A pixel whose solve fails keeps an all-zero concentration vector; the rest
/// of the map is unaffected. Pixels are distributed over the rayon pool.
#[instrument(skip_all, fields(
    channels = od.channels(),
    height = od.height(),
    width = od.width(),
))]
pub fn unmix<S: PixelSolver + ?Sized>(
    solver: &S,
    symbols: &[String],
    od: &OpticalDensityCube,
) -> Result<UnmixOutcome> {
    let (channels, height, width) = od.data().dim();
    if channels != solver.rows() {
        return Err(UnmixingError::InputError(format!(
            "{} image channels for {} overlap rows",
            channels,
            solver.rows()
        )));
    }
    let unknowns = solver.unknowns();
    if symbols.len() != unknowns {
        return Err(UnmixingError::ConfigError(format!(
            "{} chromophore symbols for {} unknowns",
            symbols.len(),
            unknowns
        )));
    }

    let data = od.data();
    let solutions: Vec<Option<DVector<f64>>> = (0..height * width)
        .into_par_iter()
        .map(|index| {
            let (y, x) = (index / width, index % width);
            let column = DVector::from_iterator(channels, data.slice(s![.., y, x]).iter().copied());
            solver.solve(&column)
        })
        .collect();

    let mut maps = Array3::<f64>::zeros((unknowns, height, width));
    let mut failed_pixels = 0;
    for (index, solution) in solutions.into_iter().enumerate() {
        let (y, x) = (index / width, index % width);
        match solution {
            Some(c) => {
                for (k, value) in c.iter().enumerate() {
                    maps[[k, y, x]] = *value;
                }
            }
            None => failed_pixels += 1,
        }
    }

    if failed_pixels > 0 {
        warn!(failed_pixels, "Pixels failed to solve and were zeroed");
    }
    debug!(pixels = height * width, "Unmixing complete");

    Ok(UnmixOutcome {
        maps: ConcentrationMaps::new(symbols.to_vec(), maps)?,
        failed_pixels,
    })
}

//! Analysis result and artifact configuration types

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::unmixing_pipeline::analysis::treatment::TreatmentEstimate;
use crate::unmixing_pipeline::calibration::MissingCoefficient;
use crate::unmixing_pipeline::segmentation::{BorderProfile, ThresholdSource};
use crate::unmixing_pipeline::spectral::SolverStrategy;
use crate::unmixing_pipeline::thb::ThbPolicy;

/// TIFF compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TiffCompression {
    /// No compression (fastest, largest file)
    #[default]
    None,
    /// LZW compression
    Lzw,
    /// Deflate compression - fast level
    DeflateFast,
    /// Deflate compression - balanced
    DeflateBalanced,
    /// Deflate compression - best compression (slower)
    DeflateBest,
}

/// Raster format for saved artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactFormat {
    #[default]
    Png,
    Tiff {
        compression: TiffCompression,
        /// Predictor tag value, 2 for horizontal differencing
        predictor: Option<u16>,
    },
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Png => "png",
            ArtifactFormat::Tiff { .. } => "tiff",
        }
    }
}

/// Files written for one run, all inside `run_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSet {
    pub run_dir: PathBuf,
    /// Normalized concentration map per chromophore symbol
    pub chromophore_maps: BTreeMap<String, PathBuf>,
    pub thb_path: Option<PathBuf>,
    pub mask_path: Option<PathBuf>,
    pub contour_path: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
}

impl ArtifactSet {
    pub fn new(run_dir: PathBuf) -> Self {
        Self {
            run_dir,
            chromophore_maps: BTreeMap::new(),
            thb_path: None,
            mask_path: None,
            contour_path: None,
            manifest_path: None,
        }
    }
}

/// Terminal outcome of one successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub session_id: String,
    pub wavelengths: Vec<u32>,
    pub chromophores: Vec<String>,
    pub solver: SolverStrategy,
    pub s_coefficient: f64,
    pub mean_lesion_thb: f64,
    pub mean_skin_thb: f64,
    pub lesion_pixels: usize,
    pub skin_pixels: usize,
    /// Threshold actually applied to the normalized THb map
    pub threshold: u8,
    pub threshold_source: ThresholdSource,
    pub thb_policy: ThbPolicy,
    pub failed_pixels: usize,
    pub missing_coefficients: Vec<MissingCoefficient>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_profile: Option<BorderProfile>,
    pub treatment: TreatmentEstimate,
    /// `None` when artifact writing is disabled
    pub artifacts: Option<ArtifactSet>,
    /// Artifact failures; the statistics above stay valid
    pub artifact_errors: Vec<String>,
    /// Degraded-path warnings in the order they were reported
    pub warnings: Vec<String>,
}

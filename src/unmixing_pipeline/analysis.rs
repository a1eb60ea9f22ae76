//! Statistics and artifact module
//!
//! Region statistics over the segmentation with the S-coefficient derived
//! from them, a treatment-category estimate, and the rasters and manifest
//! saved for each run.

mod artifacts;
mod render;
mod statistics;
mod treatment;
pub mod types;
mod writer;


pub use artifacts::{
    prune_stale, run_directory, sanitize_name, save_rasters, session_directory_name,
    write_manifest, ArtifactReport, CONTOUR_ARTIFACT, MANIFEST_FILE, MASK_ARTIFACT, THB_ARTIFACT,
};
pub use render::{render_contours, render_map, render_mask, CONTOUR_COLOR};
pub use statistics::{compute_statistics, s_coefficient, RegionStatistics, S_COEFFICIENT_MIN_SKIN};
pub use treatment::{
    estimate_treatment, ClinicalScore, GaussianKde, ScoreScale, TreatmentEstimate,
};
pub use types::{AnalysisResult, ArtifactFormat, ArtifactSet, TiffCompression};
pub use writer::{ArtifactWriter, StandardArtifactWriter};

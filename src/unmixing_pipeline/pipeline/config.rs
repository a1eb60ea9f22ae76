//! Pipeline configuration types

use std::path::PathBuf;

use crate::unmixing_pipeline::analysis::ArtifactFormat;
use crate::unmixing_pipeline::loader::Roi;
use crate::unmixing_pipeline::segmentation::DEFAULT_BLUR_SIGMA;
use crate::unmixing_pipeline::spectral::SolverStrategy;

/// Configuration for one unmixing run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub solver: SolverStrategy,
    /// Divide the overlap matrix by its largest absolute entry before solving
    pub normalize_overlap: bool,
    /// Gaussian sigma applied to the THb map before thresholding
    pub blur_sigma: f32,
    pub artifact_format: ArtifactFormat,
    /// Whether to write rasters and the manifest at all
    pub write_artifacts: bool,
    /// Whether to compute the lesion border profile
    pub border_profile: bool,
    /// Crop applied to every image right after loading
    pub roi: Option<Roi>,
    /// Whether to validate image dimensions before unmixing
    pub validate_dimensions: bool,
    /// Largest accepted width or height when validating
    pub max_dimension: Option<usize>,
    /// Parent of the per-session `processed_<id>` directories
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            solver: SolverStrategy::LeastSquares,
            normalize_overlap: false,
            blur_sigma: DEFAULT_BLUR_SIGMA,
            artifact_format: ArtifactFormat::Png,
            write_artifacts: true,
            border_profile: false,
            roi: None,
            validate_dimensions: true,
            max_dimension: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for PipelineConfig
#[derive(Default)]
pub struct PipelineConfigBuilder {
    solver: Option<SolverStrategy>,
    normalize_overlap: Option<bool>,
    blur_sigma: Option<f32>,
    artifact_format: Option<ArtifactFormat>,
    write_artifacts: Option<bool>,
    border_profile: Option<bool>,
    roi: Option<Option<Roi>>,
    validate_dimensions: Option<bool>,
    max_dimension: Option<Option<usize>>,
    output_dir: Option<PathBuf>,
}

impl PipelineConfigBuilder {
    pub fn solver(mut self, solver: SolverStrategy) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn normalize_overlap(mut self, normalize: bool) -> Self {
        self.normalize_overlap = Some(normalize);
        self
    }

    pub fn blur_sigma(mut self, sigma: f32) -> Self {
        self.blur_sigma = Some(sigma);
        self
    }

    pub fn artifact_format(mut self, format: ArtifactFormat) -> Self {
        self.artifact_format = Some(format);
        self
    }

    pub fn write_artifacts(mut self, enable: bool) -> Self {
        self.write_artifacts = Some(enable);
        self
    }

    pub fn border_profile(mut self, enable: bool) -> Self {
        self.border_profile = Some(enable);
        self
    }

    pub fn roi(mut self, roi: Option<Roi>) -> Self {
        self.roi = Some(roi);
        self
    }

    pub fn validate_dimensions(mut self, validate: bool) -> Self {
        self.validate_dimensions = Some(validate);
        self
    }

    pub fn max_dimension(mut self, max: Option<usize>) -> Self {
        self.max_dimension = Some(max);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> PipelineConfig {
        let default = PipelineConfig::default();
        PipelineConfig {
            solver: self.solver.unwrap_or(default.solver),
            normalize_overlap: self.normalize_overlap.unwrap_or(default.normalize_overlap),
            blur_sigma: self.blur_sigma.unwrap_or(default.blur_sigma),
            artifact_format: self.artifact_format.unwrap_or(default.artifact_format),
            write_artifacts: self.write_artifacts.unwrap_or(default.write_artifacts),
            border_profile: self.border_profile.unwrap_or(default.border_profile),
            roi: self.roi.unwrap_or(default.roi),
            validate_dimensions: self.validate_dimensions.unwrap_or(default.validate_dimensions),
            max_dimension: self.max_dimension.unwrap_or(default.max_dimension),
            output_dir: self.output_dir.unwrap_or(default.output_dir),
        }
    }
}

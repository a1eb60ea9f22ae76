use tracing::{info, instrument};

use crate::unmixing_pipeline::{
    analysis::{
        compute_statistics, estimate_treatment, run_directory, save_rasters, write_manifest,
        AnalysisResult, ArtifactWriter, StandardArtifactWriter, MANIFEST_FILE,
    },
    calibration::{CalibrationStore, OverlapMatrix},
    common::{
        error::{Result, UnmixingError},
        progress::{ProgressReporter, ProgressSink, Stage},
        timing::{PipelineTimings, Timer},
    },
    loader::{load_hypercube, Hypercube, ImageCrateReader, WavelengthImageReader},
    pipeline::{
        config::PipelineConfig,
        request::UnmixingRequest,
        session::{CancellationToken, SessionRegistry},
    },
    segmentation::{border_profile, Segmentation, SegmentationEngine},
    spectral::{build_solver, unmix, ConcentrationMaps, OpticalDensityCube},
    thb::{aggregate_thb, ThbOutcome},
};

/// Everything one successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub result: AnalysisResult,
    pub concentrations: ConcentrationMaps,
    pub thb: ThbOutcome,
    pub segmentation: Segmentation,
    pub timings: PipelineTimings,
}

pub struct UnmixingPipeline<R: WavelengthImageReader, W: ArtifactWriter> {
    reader: R,
    writer: W,
    config: PipelineConfig,
}

impl UnmixingPipeline<ImageCrateReader, StandardArtifactWriter> {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            reader: ImageCrateReader,
            writer: StandardArtifactWriter::new(config.artifact_format),
            config,
        }
    }
}

impl<R: WavelengthImageReader, W: ArtifactWriter> UnmixingPipeline<R, W> {
    pub fn with_custom(reader: R, writer: W, config: PipelineConfig) -> Self {
        Self {
            reader,
            writer,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PipelineConfig) {
        self.config = config;
    }

    fn validate_dimensions(&self, cube: &Hypercube) -> Result<()> {
        if !self.config.validate_dimensions {
            return Ok(());
        }

        let (width, height) = (cube.width(), cube.height());
        if width == 0 || height == 0 {
            return Err(UnmixingError::InputError(format!(
                "invalid image dimensions {}x{}",
                width, height
            )));
        }
        if let Some(max) = self.config.max_dimension {
            if width > max || height > max {
                return Err(UnmixingError::InputError(format!(
                    "image {}x{} exceeds maximum dimension {}",
                    width, height, max
                )));
            }
        }

        Ok(())
    }

    fn load_stage(&self, request: &UnmixingRequest) -> Result<(Hypercube, Option<Hypercube>)> {
        let mut cube = load_hypercube(&self.reader, &request.images)?;
        self.validate_dimensions(&cube)?;

        let mut reference = if request.references.is_empty() {
            None
        } else {
            Some(load_hypercube(&self.reader, &request.references)?)
        };

        if let Some(roi) = &self.config.roi {
            cube = cube.crop(roi)?;
            reference = reference.map(|r| r.crop(roi)).transpose()?;
        }

        Ok((cube, reference))
    }

    /// Runs every stage for `request`.
    ///
    /// `cancel` is checked before each stage; a cancelled run returns
    /// `Cancelled` and leaves no new artifacts behind. Degraded paths
    /// (missing coefficients, THb fallbacks, threshold fallbacks, failed
    /// artifact writes) are reported to `progress` and collected into
    /// [`AnalysisResult::warnings`] without failing the run.
    #[instrument(skip_all, fields(session = %request.session_id, solver = %self.config.solver))]
    pub fn run<S: CalibrationStore + ?Sized>(
        &self,
        request: &UnmixingRequest,
        store: &S,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput> {
        info!("Starting unmixing run");
        let reporter = ProgressReporter::new(progress);
        let mut timings = PipelineTimings::new();

        cancel.check(Stage::Load)?;
        reporter.stage(Stage::Load, format!("Loading {} images", request.images.len()));
        let (cube, reference) = {
            let _span = tracing::info_span!("load").entered();
            let timer = Timer::start(Stage::Load);
            let loaded = self.load_stage(request)?;
            timings.record(timer);
            loaded
        };

        cancel.check(Stage::MatrixBuild)?;
        reporter.stage(Stage::MatrixBuild, "Building overlap matrix");
        let overlap = {
            let _span = tracing::info_span!("matrix_build").entered();
            let timer = Timer::start(Stage::MatrixBuild);
            let chromophores = request.sorted_chromophores();
            let overlap = OverlapMatrix::build(
                cube.wavelengths(),
                &chromophores,
                store,
                self.config.normalize_overlap,
            )?;
            timings.record(timer);
            overlap
        };
        for missing in overlap.missing() {
            reporter.warn(
                Stage::MatrixBuild,
                format!(
                    "Coefficient for {}nm / {} not found, using 0.0",
                    missing.wavelength_nm, missing.symbol
                ),
            );
        }

        cancel.check(Stage::OdTransform)?;
        reporter.stage(Stage::OdTransform, "Computing optical density");
        let od = {
            let _span = tracing::info_span!("od_transform").entered();
            let timer = Timer::start(Stage::OdTransform);
            let od = match &reference {
                Some(reference) => OpticalDensityCube::from_reference(&cube, reference)?,
                None => OpticalDensityCube::from_hypercube(&cube),
            };
            timings.record(timer);
            od
        };

        cancel.check(Stage::Unmix)?;
        reporter.stage(
            Stage::Unmix,
            format!(
                "Unmixing {}x{} pixels ({})",
                od.width(),
                od.height(),
                self.config.solver
            ),
        );
        let outcome = {
            let _span = tracing::info_span!("unmix").entered();
            let timer = Timer::start(Stage::Unmix);
            let solver = build_solver(self.config.solver, &overlap)?;
            let outcome = unmix(solver.as_ref(), overlap.symbols(), &od)?;
            timings.record(timer);
            outcome
        };
        if outcome.failed_pixels > 0 {
            reporter.warn(
                Stage::Unmix,
                format!("{} pixels failed to solve and were zeroed", outcome.failed_pixels),
            );
        }

        cancel.check(Stage::Thb)?;
        reporter.stage(Stage::Thb, "Computing THb");
        let thb = {
            let _span = tracing::info_span!("thb").entered();
            let timer = Timer::start(Stage::Thb);
            let thb = aggregate_thb(&outcome.maps)?;
            timings.record(timer);
            thb
        };
        if let Some(diagnostic) = &thb.diagnostic {
            reporter.warn(Stage::Thb, diagnostic.clone());
        }
        if thb.sanitized_pixels > 0 {
            reporter.warn(
                Stage::Thb,
                format!("{} non-finite THb values replaced with 0", thb.sanitized_pixels),
            );
        }

        cancel.check(Stage::Segment)?;
        reporter.stage(Stage::Segment, "Segmenting lesion");
        let (segmentation, border) = {
            let _span = tracing::info_span!("segment").entered();
            let timer = Timer::start(Stage::Segment);
            let segmentation = SegmentationEngine::new(self.config.blur_sigma).segment(&thb.map)?;
            let border = self.config.border_profile.then(|| {
                border_profile(&segmentation.normalized, segmentation.threshold, &segmentation.lesion)
            });
            timings.record(timer);
            (segmentation, border)
        };
        for note in &segmentation.fallback_notes {
            reporter.warn(Stage::Segment, note.clone());
        }

        cancel.check(Stage::Stats)?;
        reporter.stage(Stage::Stats, "Computing statistics");
        let (stats, treatment) = {
            let _span = tracing::info_span!("stats").entered();
            let timer = Timer::start(Stage::Stats);
            let stats = compute_statistics(&thb.map, &segmentation.lesion)?;
            let treatment = estimate_treatment(stats.s_coefficient, request.clinical_score.as_ref())?;
            timings.record(timer);
            (stats, treatment)
        };
        if !treatment.likelihood_applied {
            reporter.warn(
                Stage::Stats,
                format!(
                    "S-coefficient {:.3} is outside the reference cohort, treatment estimate uses priors only",
                    stats.s_coefficient
                ),
            );
        }

        let mut result = AnalysisResult {
            session_id: request.session_id.clone(),
            wavelengths: cube.wavelengths().to_vec(),
            chromophores: overlap.symbols().to_vec(),
            solver: self.config.solver,
            s_coefficient: stats.s_coefficient,
            mean_lesion_thb: stats.mean_lesion_thb,
            mean_skin_thb: stats.mean_skin_thb,
            lesion_pixels: stats.lesion_pixels,
            skin_pixels: stats.skin_pixels,
            threshold: segmentation.threshold,
            threshold_source: segmentation.source,
            thb_policy: thb.policy,
            failed_pixels: outcome.failed_pixels,
            missing_coefficients: overlap.missing().to_vec(),
            border_profile: border,
            treatment,
            artifacts: None,
            artifact_errors: Vec::new(),
            warnings: Vec::new(),
        };

        cancel.check(Stage::Save)?;
        if self.config.write_artifacts {
            reporter.stage(Stage::Save, "Saving artifacts");
            let _span = tracing::info_span!("save").entered();
            let timer = Timer::start(Stage::Save);

            let run_dir = run_directory(&self.config.output_dir, &request.session_id);
            let report = save_rasters(&self.writer, &run_dir, &outcome.maps, &segmentation);
            for error in &report.errors {
                reporter.warn(Stage::Save, format!("Artifact not saved: {}", error));
            }

            let manifest_path = run_dir.join(MANIFEST_FILE);
            let mut artifacts = report.artifacts;
            artifacts.manifest_path = Some(manifest_path.clone());
            result.artifacts = Some(artifacts);
            result.artifact_errors = report.errors;
            result.warnings = reporter.take_warnings();

            if let Err(e) = write_manifest(&result, &manifest_path) {
                reporter.warn(Stage::Save, format!("Manifest not saved: {}", e));
                if let Some(artifacts) = result.artifacts.as_mut() {
                    artifacts.manifest_path = None;
                }
                result.artifact_errors.push(e.to_string());
            }
            timings.record(timer);
        } else {
            reporter.stage(Stage::Save, "Artifact writing disabled");
        }
        result.warnings.extend(reporter.take_warnings());

        info!(
            s_coefficient = result.s_coefficient,
            threshold = result.threshold,
            warnings = result.warnings.len(),
            "Unmixing run complete"
        );

        Ok(PipelineOutput {
            result,
            concentrations: outcome.maps,
            thb,
            segmentation,
            timings,
        })
    }

    /// [`UnmixingPipeline::run`] under an exclusive lease on the request's
    /// session. A second concurrent request for the same session fails with
    /// `SessionBusy`.
    pub fn run_in_session<S: CalibrationStore + ?Sized>(
        &self,
        registry: &SessionRegistry,
        request: &UnmixingRequest,
        store: &S,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput> {
        let _lease = registry.acquire(&request.session_id)?;
        self.run(request, store, progress, cancel)
    }
}

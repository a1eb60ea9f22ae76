#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use image::{GrayImage, RgbImage};
    use ndarray::Array2;

    use crate::unmixing_pipeline::analysis::{
        estimate_treatment, ArtifactWriter, ClinicalScore, ScoreScale, StandardArtifactWriter,
        MANIFEST_FILE,
    };
    use crate::unmixing_pipeline::calibration::{Chromophore, InMemoryCalibration};
    use crate::unmixing_pipeline::common::error::{Result, UnmixingError};
    use crate::unmixing_pipeline::common::progress::{
        NoProgress, ProgressEvent, ProgressLevel, Stage,
    };
    use crate::unmixing_pipeline::loader::{ImageSource, Roi, WavelengthImageReader, WavelengthSource};
    use crate::unmixing_pipeline::pipeline::{
        CancellationToken, PipelineConfig, SessionRegistry, UnmixingPipeline, UnmixingRequest,
    };
    use crate::unmixing_pipeline::segmentation::DEFAULT_BLUR_SIGMA;
    use crate::unmixing_pipeline::spectral::SolverStrategy;
    use crate::unmixing_pipeline::thb::ThbPolicy;

    const WAVELENGTHS: [u32; 8] = [450, 500, 550, 600, 650, 700, 750, 800];

    /// `Bytes([w, h, v])` is a uniform `w × h` image of value `v`;
    /// `Bytes([w, h, seed, 1])` is a deterministic pattern.
    struct MockReader {
        should_fail: bool,
    }

    impl WavelengthImageReader for MockReader {
        fn read_gray(&self, source: &ImageSource) -> Result<Array2<f64>> {
            if self.should_fail {
                return Err(UnmixingError::DecodeError("Mock decode error".to_string()));
            }
            match source {
                ImageSource::Bytes(b) if b.len() == 3 => {
                    Ok(Array2::from_elem((b[1] as usize, b[0] as usize), b[2] as f64))
                }
                ImageSource::Bytes(b) if b.len() == 4 => {
                    let seed = b[2] as usize;
                    Ok(Array2::from_shape_fn((b[1] as usize, b[0] as usize), |(y, x)| {
                        (20 + (seed * 7 + y * 3 + x * 5) % 200) as f64
                    }))
                }
                _ => Err(UnmixingError::DecodeError("Mock decode error".to_string())),
            }
        }
    }

    struct MockWriter {
        should_fail: bool,
        written: Arc<Mutex<usize>>,
    }

    impl MockWriter {
        fn record(&self) -> Result<()> {
            if self.should_fail {
                return Err(UnmixingError::EncodeError("Mock encode error".to_string()));
            }
            *self.written.lock().unwrap() += 1;
            Ok(())
        }
    }

    impl ArtifactWriter for MockWriter {
        fn write_gray(&self, _image: &GrayImage, _output: &mut dyn Write) -> Result<()> {
            self.record()
        }

        fn write_rgb(&self, _image: &RgbImage, _output: &mut dyn Write) -> Result<()> {
            self.record()
        }

        fn extension(&self) -> &'static str {
            "png"
        }
    }

    fn chromophores() -> Vec<Chromophore> {
        vec![
            Chromophore::new(3, "Melanin"),
            Chromophore::new(1, "HbO2"),
            Chromophore::new(2, "Hb"),
            Chromophore::new(4, "Bilirubin"),
        ]
    }

    /// Rank 4: the first four rows are dominated by distinct diagonal entries.
    fn store() -> InMemoryCalibration {
        let mut store = InMemoryCalibration::new();
        for (i, &nm) in WAVELENGTHS.iter().enumerate() {
            for id in 1..=4u32 {
                let j = (id - 1) as usize;
                let coefficient = if i % 4 == j { 2.0 } else { 0.01 * (i + j) as f64 };
                store.insert(nm, id, coefficient);
            }
        }
        store
    }

    fn uniform_images(value: u8) -> Vec<WavelengthSource> {
        WAVELENGTHS
            .iter()
            .map(|&nm| WavelengthSource::bytes(nm, vec![10, 10, value]))
            .collect()
    }

    fn patterned_images() -> Vec<WavelengthSource> {
        WAVELENGTHS
            .iter()
            .enumerate()
            .map(|(i, &nm)| WavelengthSource::bytes(nm, vec![12, 9, i as u8, 1]))
            .collect()
    }

    fn mock_pipeline(config: PipelineConfig) -> UnmixingPipeline<MockReader, MockWriter> {
        UnmixingPipeline::with_custom(
            MockReader { should_fail: false },
            MockWriter { should_fail: false, written: Arc::new(Mutex::new(0)) },
            config,
        )
    }

    fn no_artifacts() -> PipelineConfig {
        PipelineConfig::builder().write_artifacts(false).build()
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::builder()
            .solver(SolverStrategy::Qr)
            .normalize_overlap(true)
            .roi(Some(Roi { x: 1, y: 2, width: 3, height: 4 }))
            .max_dimension(Some(4096))
            .build();

        assert_eq!(config.solver, SolverStrategy::Qr);
        assert!(config.normalize_overlap);
        assert_eq!(config.blur_sigma, DEFAULT_BLUR_SIGMA);
        assert!(config.write_artifacts);
        assert!(config.validate_dimensions);
        assert_eq!(config.max_dimension, Some(4096));
        assert_eq!(config.roi.unwrap().height, 4);
    }

    #[test]
    fn test_uniform_mid_gray_end_to_end() {
        let temp = tempfile::tempdir().unwrap();
        let pipeline = UnmixingPipeline::with_custom(
            MockReader { should_fail: false },
            StandardArtifactWriter::default(),
            PipelineConfig::builder().output_dir(temp.path()).build(),
        );
        let request = UnmixingRequest::new("e2e", uniform_images(128), chromophores());

        let output = pipeline
            .run(&request, &store(), &NoProgress, &CancellationToken::new())
            .unwrap();

        for (_, map) in output.concentrations.iter() {
            let first = map[[0, 0]];
            assert!(first.is_finite());
            assert!(map.iter().all(|&v| v == first));
        }
        assert_eq!(output.result.chromophores, vec!["HbO2", "Hb", "Melanin", "Bilirubin"]);
        assert_eq!(output.result.thb_policy, ThbPolicy::OxyPlusDeoxy);

        let lesion = output.result.lesion_pixels;
        assert!(lesion == 0 || lesion == 100, "lesion pixels {}", lesion);
        let s = output.result.s_coefficient;
        assert!(!s.is_nan());
        assert!(s == 0.0 || s == 1.0, "s-coefficient {}", s);

        let artifacts = output.result.artifacts.as_ref().unwrap();
        assert!(output.result.artifact_errors.is_empty());
        assert_eq!(artifacts.chromophore_maps.len(), 4);
        assert!(artifacts.contour_path.as_ref().unwrap().is_file());
        assert!(artifacts.run_dir.join(MANIFEST_FILE).is_file());
        assert_eq!(output.timings.steps().len(), Stage::ALL.len());
    }

    #[test]
    fn test_channel_order_invariance() {
        let pipeline = mock_pipeline(no_artifacts());
        let forward = UnmixingRequest::new("a", patterned_images(), chromophores());
        let mut reversed_images = patterned_images();
        reversed_images.reverse();
        let reversed = UnmixingRequest::new("a", reversed_images, chromophores());

        let cancel = CancellationToken::new();
        let a = pipeline.run(&forward, &store(), &NoProgress, &cancel).unwrap();
        let b = pipeline.run(&reversed, &store(), &NoProgress, &cancel).unwrap();

        assert_eq!(a.concentrations, b.concentrations);
        assert_eq!(a.result, b.result);
        assert_eq!(a.result.wavelengths, WAVELENGTHS.to_vec());
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder().output_dir(temp.path()).build();
        let pipeline = UnmixingPipeline::with_custom(
            MockReader { should_fail: false },
            StandardArtifactWriter::default(),
            config,
        );
        let request = UnmixingRequest::new("same", patterned_images(), chromophores());
        let cancel = CancellationToken::new();

        let first = pipeline.run(&request, &store(), &NoProgress, &cancel).unwrap();
        let hbo2 = first.result.artifacts.as_ref().unwrap().chromophore_maps["HbO2"].clone();
        let first_bytes = std::fs::read(&hbo2).unwrap();
        let manifest = temp.path().join("processed_same").join(MANIFEST_FILE);
        let first_manifest = std::fs::read(&manifest).unwrap();

        let second = pipeline.run(&request, &store(), &NoProgress, &cancel).unwrap();
        assert_eq!(first.concentrations, second.concentrations);
        assert_eq!(first.result, second.result);
        assert_eq!(std::fs::read(&hbo2).unwrap(), first_bytes);
        assert_eq!(std::fs::read(&manifest).unwrap(), first_manifest);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_melanin_only_falls_back_with_warning() {
        let pipeline = mock_pipeline(no_artifacts());
        let request = UnmixingRequest::new("m", patterned_images(), vec![Chromophore::new(3, "Melanin")]);
        let events = Mutex::new(Vec::new());
        let sink = |e: &ProgressEvent| events.lock().unwrap().push(e.clone());

        let output = pipeline
            .run(&request, &store(), &sink, &CancellationToken::new())
            .unwrap();

        assert_eq!(output.result.thb_policy, ThbPolicy::FirstChromophore);
        assert_eq!(output.thb.map, output.concentrations.abs_map(0));

        let events = events.lock().unwrap();
        let warning = events
            .iter()
            .find(|e| e.level == ProgressLevel::Warning && e.stage == Stage::Thb)
            .expect("THb fallback warning");
        assert!(warning.message.contains("Melanin"));
        assert!(output.result.warnings.contains(&warning.message));

        let stages: Vec<Stage> = events
            .iter()
            .filter(|e| e.level == ProgressLevel::Info)
            .map(|e| e.stage)
            .collect();
        assert_eq!(stages, Stage::ALL.to_vec());
    }

    #[test]
    fn test_missing_coefficient_is_warning() {
        let pipeline = mock_pipeline(no_artifacts());
        let mut partial = InMemoryCalibration::new();
        for &nm in &WAVELENGTHS[1..] {
            partial.insert(nm, 1, 1.0);
        }
        let request = UnmixingRequest::new("c", uniform_images(100), vec![Chromophore::new(1, "HbO2")]);

        let output = pipeline
            .run(&request, &partial, &NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!(output.result.missing_coefficients.len(), 1);
        assert_eq!(output.result.missing_coefficients[0].wavelength_nm, 450);
        assert!(output.result.warnings.iter().any(|w| w.contains("450nm")));
    }

    #[test]
    fn test_fatal_inputs() {
        let pipeline = mock_pipeline(no_artifacts());
        let cancel = CancellationToken::new();

        let empty = UnmixingRequest::new("f", Vec::new(), chromophores());
        assert!(matches!(
            pipeline.run(&empty, &store(), &NoProgress, &cancel),
            Err(UnmixingError::InputError(ref m)) if m == "no images"
        ));

        let none = UnmixingRequest::new("f", uniform_images(128), Vec::new());
        assert!(matches!(
            pipeline.run(&none, &store(), &NoProgress, &cancel),
            Err(UnmixingError::ConfigError(ref m)) if m == "no chromophores"
        ));

        let mut mismatched = uniform_images(128);
        mismatched[3] = WavelengthSource::bytes(WAVELENGTHS[3], vec![11, 10, 128]);
        let mismatched = UnmixingRequest::new("f", mismatched, chromophores());
        assert!(matches!(
            pipeline.run(&mismatched, &store(), &NoProgress, &cancel),
            Err(UnmixingError::InputError(ref m)) if m.starts_with("size mismatch")
        ));
    }

    #[test]
    fn test_reader_failure() {
        let pipeline = UnmixingPipeline::with_custom(
            MockReader { should_fail: true },
            MockWriter { should_fail: false, written: Arc::new(Mutex::new(0)) },
            no_artifacts(),
        );
        let request = UnmixingRequest::new("r", uniform_images(128), chromophores());
        let result = pipeline.run(&request, &store(), &NoProgress, &CancellationToken::new());
        assert!(matches!(result.unwrap_err(), UnmixingError::DecodeError(_)));
    }

    #[test]
    fn test_dimension_validation() {
        let config = PipelineConfig::builder()
            .write_artifacts(false)
            .max_dimension(Some(8))
            .build();
        let request = UnmixingRequest::new("d", uniform_images(128), chromophores());
        let result = mock_pipeline(config).run(&request, &store(), &NoProgress, &CancellationToken::new());
        assert!(matches!(result.unwrap_err(), UnmixingError::InputError(_)));
    }

    #[test]
    fn test_roi_crops_every_output() {
        let config = PipelineConfig::builder()
            .write_artifacts(false)
            .roi(Some(Roi { x: 2, y: 1, width: 5, height: 4 }))
            .border_profile(true)
            .build();
        let request = UnmixingRequest::new("roi", patterned_images(), chromophores());
        let output = mock_pipeline(config)
            .run(&request, &store(), &NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!((output.concentrations.height(), output.concentrations.width()), (4, 5));
        assert_eq!(output.thb.map.dim(), (4, 5));
        assert_eq!(output.result.lesion_pixels + output.result.skin_pixels, 20);
        assert!(output.result.border_profile.is_some());
    }

    #[test]
    fn test_reference_normalization_applies() {
        let pipeline = mock_pipeline(no_artifacts());
        let request = UnmixingRequest::new("w", uniform_images(100), chromophores())
            .with_references(uniform_images(200));
        let with_reference = pipeline
            .run(&request, &store(), &NoProgress, &CancellationToken::new())
            .unwrap();
        let plain = pipeline
            .run(
                &UnmixingRequest::new("w", uniform_images(100), chromophores()),
                &store(),
                &NoProgress,
                &CancellationToken::new(),
            )
            .unwrap();
        assert_ne!(with_reference.concentrations, plain.concentrations);
    }

    #[test]
    fn test_qr_solver_matches_least_squares() {
        let request = UnmixingRequest::new("q", patterned_images(), chromophores());
        let cancel = CancellationToken::new();
        let lstsq = mock_pipeline(no_artifacts())
            .run(&request, &store(), &NoProgress, &cancel)
            .unwrap();
        let qr = mock_pipeline(
            PipelineConfig::builder()
                .write_artifacts(false)
                .solver(SolverStrategy::Qr)
                .build(),
        )
        .run(&request, &store(), &NoProgress, &cancel)
        .unwrap();

        for (l, q) in lstsq
            .concentrations
            .data()
            .iter()
            .zip(qr.concentrations.data().iter())
        {
            assert!((l - q).abs() < 1e-9);
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = UnmixingRequest::new("x", uniform_images(128), chromophores());
        let err = mock_pipeline(no_artifacts())
            .run(&request, &store(), &NoProgress, &cancel)
            .unwrap_err();
        assert!(matches!(err, UnmixingError::Cancelled(ref s) if s == "load"));
    }

    #[test]
    fn test_cancelled_mid_run_writes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let written = Arc::new(Mutex::new(0));
        let pipeline = UnmixingPipeline::with_custom(
            MockReader { should_fail: false },
            MockWriter { should_fail: false, written: written.clone() },
            PipelineConfig::builder().output_dir(temp.path()).build(),
        );
        let cancel = CancellationToken::new();
        let sink = |e: &ProgressEvent| {
            if e.stage == Stage::Thb {
                cancel.cancel();
            }
        };
        let request = UnmixingRequest::new("x", uniform_images(128), chromophores());

        let err = pipeline.run(&request, &store(), &sink, &cancel).unwrap_err();
        assert!(matches!(err, UnmixingError::Cancelled(ref s) if s == "segment"));
        assert_eq!(*written.lock().unwrap(), 0);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_session_busy() {
        let registry = SessionRegistry::new();
        let pipeline = mock_pipeline(no_artifacts());
        let request = UnmixingRequest::new("busy", uniform_images(128), chromophores());
        let cancel = CancellationToken::new();

        let lease = registry.acquire("busy").unwrap();
        let err = pipeline
            .run_in_session(&registry, &request, &store(), &NoProgress, &cancel)
            .unwrap_err();
        assert!(matches!(err, UnmixingError::SessionBusy(_)));

        drop(lease);
        assert!(pipeline
            .run_in_session(&registry, &request, &store(), &NoProgress, &cancel)
            .is_ok());
        assert!(!registry.is_active("busy"));
    }

    #[test]
    fn test_treatment_estimate_follows_clinical_score() {
        let pipeline = mock_pipeline(no_artifacts());
        let score = ClinicalScore { scale: ScoreScale::Hss, value: 10.0 };
        let request = UnmixingRequest::new("score", uniform_images(128), chromophores())
            .with_clinical_score(Some(score));

        let output = pipeline
            .run(&request, &store(), &NoProgress, &CancellationToken::new())
            .unwrap();

        let treatment = &output.result.treatment;
        assert_eq!(treatment.score, Some(score));
        assert!(treatment.likelihood_applied);
        assert_eq!(
            *treatment,
            estimate_treatment(output.result.s_coefficient, Some(&score)).unwrap()
        );
    }

    #[test]
    fn test_sessions_sharing_output_directory_are_serialized() {
        let registry = SessionRegistry::new();
        let pipeline = mock_pipeline(no_artifacts());
        let request = UnmixingRequest::new("a_b", uniform_images(128), chromophores());
        let cancel = CancellationToken::new();

        let lease = registry.acquire("a/b").unwrap();
        let err = pipeline
            .run_in_session(&registry, &request, &store(), &NoProgress, &cancel)
            .unwrap_err();
        assert!(matches!(err, UnmixingError::SessionBusy(ref id) if id == "a_b"));

        drop(lease);
        assert!(pipeline
            .run_in_session(&registry, &request, &store(), &NoProgress, &cancel)
            .is_ok());
    }

    #[test]
    fn test_artifact_failure_keeps_statistics() {
        let temp = tempfile::tempdir().unwrap();
        let pipeline = UnmixingPipeline::with_custom(
            MockReader { should_fail: false },
            MockWriter { should_fail: true, written: Arc::new(Mutex::new(0)) },
            PipelineConfig::builder().output_dir(temp.path()).build(),
        );
        let request = UnmixingRequest::new("fail", patterned_images(), chromophores());

        let output = pipeline
            .run(&request, &store(), &NoProgress, &CancellationToken::new())
            .unwrap();

        assert_eq!(output.result.artifact_errors.len(), 7);
        assert!(output.result.warnings.iter().any(|w| w.starts_with("Artifact not saved")));
        assert!(output.result.s_coefficient.is_finite());
        assert_eq!(output.result.lesion_pixels + output.result.skin_pixels, 108);
        let artifacts = output.result.artifacts.unwrap();
        assert!(artifacts.chromophore_maps.is_empty());
        assert!(artifacts.manifest_path.unwrap().is_file());
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use spectral_unmix::logger;
use spectral_unmix::unmixing_pipeline::{
    ArtifactFormat, CalibrationFile, CancellationToken, ClinicalScore, NoProgress, PipelineConfig,
    Roi, SessionRegistry, SolverStrategy, TiffCompression, UnmixingPipeline, UnmixingRequest,
    WavelengthSource,
};

#[derive(Parser)]
#[command(name = "spectral-unmix")]
#[command(version, about = "Spectral unmixing and lesion segmentation for multi-wavelength skin images", long_about = None)]
struct Cli {
    /// Capture at one wavelength, e.g. 450=blue.png (repeatable)
    #[arg(long = "image", value_name = "NM=PATH", value_parser = parse_wavelength_path, required = true)]
    images: Vec<(u32, PathBuf)>,

    /// White-standard capture at one wavelength (repeatable)
    #[arg(long = "reference", value_name = "NM=PATH", value_parser = parse_wavelength_path)]
    references: Vec<(u32, PathBuf)>,

    /// Calibration file listing chromophores and coefficients (JSON)
    #[arg(short, long, value_name = "FILE")]
    calibration: PathBuf,

    /// Session id, names the output subdirectory
    #[arg(short, long, value_name = "ID", default_value = "cli")]
    session: String,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = "output")]
    output: PathBuf,

    /// Per-pixel solver (lstsq or qr)
    #[arg(long, value_name = "SOLVER", default_value = "lstsq", value_parser = parse_solver)]
    solver: SolverStrategy,

    /// Divide the overlap matrix by its largest absolute entry
    #[arg(long)]
    normalize_overlap: bool,

    /// Gaussian sigma applied to the THb map before thresholding
    #[arg(long, value_name = "FLOAT", default_value = "2.0")]
    sigma: f32,

    /// Artifact raster format
    #[arg(long, value_enum, default_value = "png")]
    format: FormatArg,

    /// TIFF compression, ignored for PNG
    #[arg(long, value_enum, default_value = "none")]
    compression: CompressionArg,

    /// Crop applied after loading (x,y,width,height)
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_roi)]
    roi: Option<Roi>,

    /// Clinical score weighting the treatment estimate, e.g. HAS=3
    #[arg(long, value_name = "SCALE=VALUE", value_parser = parse_score)]
    score: Option<ClinicalScore>,

    /// Compute the lesion border profile
    #[arg(long)]
    border_profile: bool,

    /// Skip writing rasters and the manifest
    #[arg(long)]
    no_artifacts: bool,

    /// Enable debug output including stage timings
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Png,
    Tiff,
}

#[derive(Clone, Copy, ValueEnum)]
enum CompressionArg {
    None,
    Lzw,
    DeflateFast,
    DeflateBalanced,
    DeflateBest,
}

impl From<CompressionArg> for TiffCompression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => TiffCompression::None,
            CompressionArg::Lzw => TiffCompression::Lzw,
            CompressionArg::DeflateFast => TiffCompression::DeflateFast,
            CompressionArg::DeflateBalanced => TiffCompression::DeflateBalanced,
            CompressionArg::DeflateBest => TiffCompression::DeflateBest,
        }
    }
}

fn parse_wavelength_path(s: &str) -> Result<(u32, PathBuf), String> {
    let (nm, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NM=PATH, got '{}'", s))?;
    let nm = nm
        .trim()
        .trim_end_matches("nm")
        .parse::<u32>()
        .map_err(|e| format!("invalid wavelength '{}': {}", nm, e))?;
    Ok((nm, PathBuf::from(path)))
}

fn parse_solver(s: &str) -> Result<SolverStrategy, String> {
    s.parse::<SolverStrategy>().map_err(|e| e.to_string())
}

fn parse_roi(s: &str) -> Result<Roi, String> {
    s.parse::<Roi>().map_err(|e| e.to_string())
}

fn parse_score(s: &str) -> Result<ClinicalScore, String> {
    s.parse::<ClinicalScore>().map_err(|e| e.to_string())
}

fn sources(pairs: &[(u32, PathBuf)]) -> Vec<WavelengthSource> {
    pairs
        .iter()
        .map(|(nm, path)| WavelengthSource::path(*nm, path.clone()))
        .collect()
}

fn run(cli: Cli) -> Result<()> {
    let calibration = CalibrationFile::load(&cli.calibration)
        .with_context(|| format!("loading calibration {}", cli.calibration.display()))?;

    let artifact_format = match cli.format {
        FormatArg::Png => ArtifactFormat::Png,
        FormatArg::Tiff => ArtifactFormat::Tiff {
            compression: cli.compression.into(),
            predictor: None,
        },
    };
    let config = PipelineConfig::builder()
        .solver(cli.solver)
        .normalize_overlap(cli.normalize_overlap)
        .blur_sigma(cli.sigma)
        .artifact_format(artifact_format)
        .write_artifacts(!cli.no_artifacts)
        .border_profile(cli.border_profile)
        .roi(cli.roi)
        .output_dir(&cli.output)
        .build();
    let pipeline = UnmixingPipeline::new(config);

    info!("Spectral unmixing pipeline initialized");
    info!("Solver: {}", pipeline.config().solver);
    info!("Artifacts: {:?}", pipeline.config().artifact_format);

    let request = UnmixingRequest::new(
        cli.session,
        sources(&cli.images),
        calibration.sorted_chromophores(),
    )
    .with_references(sources(&cli.references))
    .with_clinical_score(cli.score);

    let output = pipeline
        .run_in_session(
            &SessionRegistry::new(),
            &request,
            &calibration.store(),
            &NoProgress,
            &CancellationToken::new(),
        )
        .context("unmixing run failed")?;

    info!("\n{}", output.timings.summary());
    println!("{}", serde_json::to_string_pretty(&output.result)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    info!("Starting spectral-unmix...");

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

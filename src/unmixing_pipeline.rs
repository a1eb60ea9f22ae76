//! Spectral unmixing pipeline module
//!
//! Turns a stack of single-wavelength skin captures into per-chromophore
//! concentration maps, a total hemoglobin map, a lesion/skin segmentation
//! and the S-coefficient. Modules follow the data flow: loading,
//! calibration, spectral inversion, THb, segmentation, analysis, and the
//! pipeline that orchestrates them.

pub mod analysis;
pub mod calibration;
pub mod common;
pub mod loader;
pub mod pipeline;
pub mod segmentation;
pub mod spectral;
pub mod thb;

pub use common::{
    ChannelProgress,
    NoProgress,
    PipelineTimings,
    ProgressEvent,
    ProgressLevel,
    ProgressSink,
    Result,
    Stage,
    UnmixingError,
};

pub use loader::{
    Hypercube,
    ImageCrateReader,
    ImageSource,
    Roi,
    WavelengthImageReader,
    WavelengthSource,
};

pub use calibration::{
    CalibrationFile,
    CalibrationStore,
    Chromophore,
    InMemoryCalibration,
    OverlapMatrix,
};

pub use spectral::{
    ConcentrationMaps,
    OpticalDensityCube,
    SolverStrategy,
};

pub use thb::{ThbOutcome, ThbPolicy};

pub use segmentation::{
    Segmentation,
    SegmentationEngine,
    ThresholdSource,
};

pub use analysis::{
    AnalysisResult,
    ArtifactFormat,
    ArtifactSet,
    ArtifactWriter,
    ClinicalScore,
    ScoreScale,
    StandardArtifactWriter,
    TiffCompression,
    TreatmentEstimate,
};

pub use pipeline::{
    CancellationToken,
    PipelineConfig,
    PipelineConfigBuilder,
    PipelineOutput,
    SessionRegistry,
    UnmixingPipeline,
    UnmixingRequest,
};

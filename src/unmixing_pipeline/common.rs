//! Common utilities module
//!
//! This module contains shared utilities used across the unmixing pipeline.

pub mod error;
pub mod progress;
pub mod timing;

pub use error::{Result, UnmixingError};
pub use progress::{
    ChannelProgress, NoProgress, ProgressEvent, ProgressLevel, ProgressReporter, ProgressSink,
    Stage,
};
pub use timing::{PipelineTimings, StepTiming, Timer};

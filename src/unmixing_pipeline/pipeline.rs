//! Unmixing pipeline module
//!
//! Wires the stages together: load, overlap matrix, optical density, unmix,
//! THb, segmentation, statistics and artifacts. Also owns run configuration,
//! the per-session lock and cancellation.

pub mod config;
mod request;
mod runner;
mod session;

#[cfg(test)]
mod tests;

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use request::UnmixingRequest;
pub use runner::{PipelineOutput, UnmixingPipeline};
pub use session::{CancellationToken, SessionLease, SessionRegistry};

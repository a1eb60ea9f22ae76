//! Segmentation module
//!
//! Smooths the THb map, picks a threshold with a fallback ladder and splits
//! the pixels into lesion and skin.

mod border;
mod engine;
mod smoothing;
mod threshold;


pub use border::{border_profile, BorderLevel, BorderProfile};
pub use engine::{lesion_mask, Segmentation, SegmentationEngine, ThresholdSource, FALLBACK_THRESHOLD};
pub use smoothing::{finite_range, normalize_to_u8, smooth, DEFAULT_BLUR_SIGMA, NORMALIZE_EPSILON};
pub use threshold::{HistogramOtsu, ImageprocOtsu, ThresholdMethod};

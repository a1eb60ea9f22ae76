//! Image loading module
//!
//! Reads per-wavelength captures and stacks them into a hypercube.

mod image_reader;
mod reader;
mod stack;
pub mod types;


pub use image_reader::ImageCrateReader;
pub use reader::WavelengthImageReader;
pub use stack::{load_hypercube, stack_images};
pub use types::{Hypercube, ImageSource, Roi, WavelengthImage, WavelengthSource};

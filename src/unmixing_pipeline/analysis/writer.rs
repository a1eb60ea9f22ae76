use std::io::{Cursor, Write};

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder, RgbImage};
use tiff::encoder::colortype::{ColorType, Gray8, RGB8};
use tiff::encoder::compression::DeflateLevel;
use tiff::encoder::{Compression, TiffEncoder};
use tiff::tags::Predictor;
use tracing::debug;

use crate::unmixing_pipeline::analysis::types::{ArtifactFormat, TiffCompression};
use crate::unmixing_pipeline::common::error::{Result, UnmixingError};

/// Encodes artifact rasters.
pub trait ArtifactWriter {
    fn write_gray(&self, image: &GrayImage, output: &mut dyn Write) -> Result<()>;
    fn write_rgb(&self, image: &RgbImage, output: &mut dyn Write) -> Result<()>;
    /// File extension for the rasters this writer produces, without the dot.
    fn extension(&self) -> &'static str;
}

/// PNG through the `image` crate or TIFF through the `tiff` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardArtifactWriter {
    format: ArtifactFormat,
}

impl StandardArtifactWriter {
    pub fn new(format: ArtifactFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    fn write_png(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        color: ExtendedColorType,
        output: &mut dyn Write,
    ) -> Result<()> {
        PngEncoder::new(output)
            .write_image(data, width, height, color)
            .map_err(|e| UnmixingError::EncodeError(e.to_string()))
    }

    fn write_tiff<C: ColorType<Inner = u8>>(
        &self,
        data: &[u8],
        width: u32,
        height: u32,
        compression: TiffCompression,
        predictor: Option<u16>,
        output: &mut dyn Write,
    ) -> Result<()> {
        let mut buffer = Vec::new();

        let compression = match compression {
            TiffCompression::None => Compression::Uncompressed,
            TiffCompression::Lzw => Compression::Lzw,
            TiffCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
            TiffCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
            TiffCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
        };

        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
                .map_err(|e| UnmixingError::EncodeError(e.to_string()))?
                .with_compression(compression);

            if let Some(predictor_val) = predictor {
                let predictor = match predictor_val {
                    2 => Predictor::Horizontal,
                    _ => Predictor::None,
                };
                encoder = encoder.with_predictor(predictor);
            }

            encoder
                .write_image::<C>(width, height, data)
                .map_err(|e| UnmixingError::EncodeError(e.to_string()))?;
        }

        output
            .write_all(&buffer)
            .map_err(|e| UnmixingError::OutputWriteError(e.to_string()))
    }
}

impl ArtifactWriter for StandardArtifactWriter {
    fn write_gray(&self, image: &GrayImage, output: &mut dyn Write) -> Result<()> {
        debug!("Encoding gray artifact: {}x{}", image.width(), image.height());
        match self.format {
            ArtifactFormat::Png => self.write_png(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::L8,
                output,
            ),
            ArtifactFormat::Tiff { compression, predictor } => self.write_tiff::<Gray8>(
                image.as_raw(),
                image.width(),
                image.height(),
                compression,
                predictor,
                output,
            ),
        }
    }

    fn write_rgb(&self, image: &RgbImage, output: &mut dyn Write) -> Result<()> {
        debug!("Encoding RGB artifact: {}x{}", image.width(), image.height());
        match self.format {
            ArtifactFormat::Png => self.write_png(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
                output,
            ),
            ArtifactFormat::Tiff { compression, predictor } => self.write_tiff::<RGB8>(
                image.as_raw(),
                image.width(),
                image.height(),
                compression,
                predictor,
                output,
            ),
        }
    }

    fn extension(&self) -> &'static str {
        self.format.extension()
    }
}

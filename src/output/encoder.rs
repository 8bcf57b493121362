use std::io::Write;

use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::codecs::png::PngEncoder as ImagePngEncoder;
use image::{ExtendedColorType, ImageEncoder as _};
use serde::{Deserialize, Serialize};

use crate::error::WriteError;

/// Still-image compression for RGB frames.
///
/// Shared by every writer thread; implementations must be deterministic
/// for identical input and quality.
pub trait ImageEncoder: Send + Sync {
    /// Encode packed RGB into `out`. `quality` is 1..=100 and may be
    /// ignored by lossless formats.
    fn encode(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
        quality: u8,
        out: &mut dyn Write,
    ) -> Result<(), WriteError>;

    /// File extension of the produced images, without the dot.
    fn extension(&self) -> &'static str;
}

/// Output image formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn encoder(&self) -> Box<dyn ImageEncoder> {
        match self {
            Self::Jpeg => Box::new(JpegEncoder),
            Self::Png => Box::new(PngEncoder),
        }
    }
}

fn encode_failure(width: u32, height: u32, err: impl ToString) -> WriteError {
    WriteError::Encode {
        width,
        height,
        reason: err.to_string(),
    }
}

fn check_len(rgb: &[u8], width: u32, height: u32) -> Result<(), WriteError> {
    let expected = width as usize * height as usize * 3;
    if rgb.len() != expected || expected == 0 {
        return Err(encode_failure(
            width,
            height,
            format!("buffer holds {} bytes, expected {}", rgb.len(), expected),
        ));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JpegEncoder;

impl ImageEncoder for JpegEncoder {
    fn encode(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
        quality: u8,
        out: &mut dyn Write,
    ) -> Result<(), WriteError> {
        check_len(rgb, width, height)?;
        ImageJpegEncoder::new_with_quality(out, quality.clamp(1, 100))
            .encode(rgb, width, height, ExtendedColorType::Rgb8)
            .map_err(|e| encode_failure(width, height, e))
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn encode(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
        _quality: u8,
        out: &mut dyn Write,
    ) -> Result<(), WriteError> {
        check_len(rgb, width, height)?;
        ImagePngEncoder::new(out)
            .write_image(rgb, width, height, ExtendedColorType::Rgb8)
            .map_err(|e| encode_failure(width, height, e))
    }

    fn extension(&self) -> &'static str {
        "png"
    }
}

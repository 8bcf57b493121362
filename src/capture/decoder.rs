use jpeg_decoder::{Decoder as JpegDecoder, PixelFormat as JpegPixelFormat};

use super::frame::{CompressedUnit, PixelFormat, RawPicture};
use super::source::Decoder;
use crate::error::CaptureError;

/// Decodes each unit as a standalone JPEG (MJPEG streams and JPEG replays).
#[derive(Debug, Default)]
pub struct MjpegDecoder;

impl Decoder for MjpegDecoder {
    fn decode(&mut self, unit: CompressedUnit) -> Result<Option<RawPicture>, CaptureError> {
        let mut decoder = JpegDecoder::new(unit.data.as_ref());
        let data = decoder
            .decode()
            .map_err(|e| CaptureError::Decode(e.to_string()))?;
        let info = decoder
            .info()
            .ok_or_else(|| CaptureError::Decode("JPEG header missing".into()))?;

        let format = match info.pixel_format {
            JpegPixelFormat::RGB24 => PixelFormat::Rgb24,
            JpegPixelFormat::L8 => PixelFormat::Gray8,
            JpegPixelFormat::CMYK32 => PixelFormat::Cmyk32,
            other => {
                return Err(CaptureError::Codec(format!(
                    "unsupported JPEG pixel format {:?}",
                    other
                )))
            }
        };

        Ok(Some(RawPicture {
            data,
            width: info.width as u32,
            height: info.height as u32,
            format,
            pts_ns: unit.pts_ns,
        }))
    }
}

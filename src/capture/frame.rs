use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One decoded, timestamped RGB image moving through the pipeline.
///
/// Not `Clone`. A frame is owned by one stage at a time and moves from
/// capture to the queue to a single writer.
#[derive(Debug)]
pub struct Frame {
    /// Tightly packed interleaved RGB, `width * height * 3` bytes.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Assigned by the capture stage, starting at 0 for each session.
    pub sequence: u64,
    /// Wall clock (ms since epoch) when decode completed.
    pub receive_time_ms: u64,
    pub hardware_time_ns: u64,
    /// False when `hardware_time_ns` was synthesized from `receive_time_ms`.
    pub hardware_time_valid: bool,
}

impl Frame {
    /// Stamp a decoded picture. Without a presentation timestamp the
    /// hardware time falls back to the receive time scaled to nanoseconds.
    pub fn stamp(decoded: DecodedFrame, sequence: u64, receive_time_ms: u64) -> Self {
        let (hardware_time_ns, hardware_time_valid) = match decoded.pts_ns {
            Some(pts) => (pts, true),
            None => (receive_time_ms.saturating_mul(1_000_000), false),
        };

        Self {
            pixels: decoded.rgb,
            width: decoded.width,
            height: decoded.height,
            sequence,
            receive_time_ms,
            hardware_time_ns,
            hardware_time_valid,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Packed RGB output of the decode + convert collaborators.
#[derive(Debug)]
pub struct DecodedFrame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp on the source clock, if the stream carried one.
    pub pts_ns: Option<u64>,
}

/// One compressed unit read off the source.
#[derive(Debug, Clone)]
pub struct CompressedUnit {
    pub data: Bytes,
    pub pts_ns: Option<u64>,
}

/// Decoder output before color conversion.
#[derive(Debug)]
pub struct RawPicture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pts_ns: Option<u64>,
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Gray8,
    Yuyv4,
    Cmyk32,
}

impl PixelFormat {
    /// Expected buffer length for a picture of this format.
    pub fn buffer_len(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Rgb24 | Self::Bgr24 => pixels * 3,
            Self::Gray8 => pixels,
            Self::Yuyv4 => pixels * 2,
            Self::Cmyk32 => pixels * 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(pts_ns: Option<u64>) -> DecodedFrame {
        DecodedFrame {
            rgb: vec![0; 2 * 2 * 3],
            width: 2,
            height: 2,
            pts_ns,
        }
    }

    #[test]
    fn stamp_uses_presentation_timestamp() {
        let frame = Frame::stamp(decoded(Some(33_366_666)), 7, 1_700_000_000_123);
        assert!(frame.hardware_time_valid);
        assert_eq!(frame.hardware_time_ns, 33_366_666);
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.byte_len(), 12);
    }

    #[test]
    fn stamp_falls_back_to_receive_time() {
        let frame = Frame::stamp(decoded(None), 0, 1_700_000_000_123);
        assert!(!frame.hardware_time_valid);
        assert_eq!(frame.hardware_time_ns, 1_700_000_000_123_000_000);
    }
}

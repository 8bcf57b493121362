//! Collaborator seams between the capture stage and the outside world.
//!
//! A session opens its source through a [`SourceConnector`] on the capture
//! thread and then pulls [`DecodedFrame`]s from the returned [`FrameSource`]
//! until stopped. Sources built from separate transport, decoder and color
//! conversion pieces are assembled with [`DecodingSource`].

use serde::{Deserialize, Serialize};

use crate::capture::frame::{CompressedUnit, DecodedFrame, RawPicture};
use crate::error::CaptureError;

/// Transport knobs every source honours where it can.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportOptions {
    /// Prefer reliable (TCP interleaved) transport over best-effort UDP.
    pub reliable: bool,
    /// Upper bound on jitter buffering, in milliseconds.
    pub max_delay_ms: u32,
    /// Pacing for finite replays, frames per second.
    pub replay_fps: u32,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            reliable: true,
            max_delay_ms: 500,
            replay_fps: 30,
        }
    }
}

/// Reads compressed units (packets) off a connection.
pub trait PacketSource {
    fn read_unit(&mut self) -> Result<CompressedUnit, CaptureError>;
}

/// Turns compressed units into raw pictures.
pub trait Decoder {
    /// `Ok(None)` means the decoder needs more input before it can emit.
    fn decode(&mut self, unit: CompressedUnit) -> Result<Option<RawPicture>, CaptureError>;
}

/// Converts raw pictures to tightly packed RGB.
pub trait ColorConverter {
    fn convert(&mut self, picture: RawPicture) -> Result<DecodedFrame, CaptureError>;
}

/// What the capture stage pulls from: one decoded RGB frame per call.
pub trait FrameSource {
    /// `Ok(None)` means nothing is ready yet; the caller loops.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, CaptureError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String {
        String::from("frame source")
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, CaptureError> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Opens a source for an address. Called on the capture thread, so the
/// returned source never crosses threads.
pub trait SourceConnector: Send + Sync {
    fn connect(
        &self,
        address: &str,
        options: &TransportOptions,
    ) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// A [`FrameSource`] assembled from packet, decode and conversion stages.
pub struct DecodingSource<P, D, C> {
    packets: P,
    decoder: D,
    converter: C,
    label: String,
}

impl<P, D, C> DecodingSource<P, D, C>
where
    P: PacketSource,
    D: Decoder,
    C: ColorConverter,
{
    pub fn new(packets: P, decoder: D, converter: C, label: impl Into<String>) -> Self {
        Self {
            packets,
            decoder,
            converter,
            label: label.into(),
        }
    }
}

impl<P, D, C> FrameSource for DecodingSource<P, D, C>
where
    P: PacketSource,
    D: Decoder,
    C: ColorConverter,
{
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, CaptureError> {
        let unit = self.packets.read_unit()?;
        match self.decoder.decode(unit)? {
            Some(picture) => self.converter.convert(picture).map(Some),
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

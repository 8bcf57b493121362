pub mod convert;
pub mod decoder;
pub mod frame;
#[cfg(feature = "rtsp-gstreamer")]
pub mod gst_capture;
pub mod replay;
pub mod source;
pub mod synthetic;

use std::path::Path;
use std::time::{Duration, Instant};

pub use frame::{DecodedFrame, Frame, PixelFormat};
pub use source::{FrameSource, SourceConnector, TransportOptions};

use crate::error::CaptureError;
use convert::RgbConverter;
use decoder::MjpegDecoder;
use replay::DirectoryPackets;
use source::DecodingSource;
use synthetic::{SyntheticConfig, SyntheticSource};

/// Opens sources by address scheme:
///
/// - `stub://[?frames=N&fps=N&width=N&height=N&pts=0|1]` synthetic frames
/// - `file://<dir>` JPEG replay
/// - `rtsp://...` GStreamer ingest (`rtsp-gstreamer` feature)
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnector;

impl SourceConnector for DefaultConnector {
    fn connect(
        &self,
        address: &str,
        options: &TransportOptions,
    ) -> Result<Box<dyn FrameSource>, CaptureError> {
        if address.starts_with("stub://") {
            let config = SyntheticConfig::from_address(address)?;
            return Ok(Box::new(SyntheticSource::new(config)));
        }

        if let Some(dir) = address.strip_prefix("file://") {
            let packets = DirectoryPackets::open(Path::new(dir), options.replay_fps)?;
            return Ok(Box::new(DecodingSource::new(
                packets,
                MjpegDecoder,
                RgbConverter,
                address,
            )));
        }

        if address.starts_with("rtsp://") || address.starts_with("rtsps://") {
            #[cfg(feature = "rtsp-gstreamer")]
            {
                return Ok(Box::new(gst_capture::GstRtspSource::open(address, options)?));
            }
            #[cfg(not(feature = "rtsp-gstreamer"))]
            {
                return Err(CaptureError::Connection {
                    address: address.to_string(),
                    reason: "RTSP requires the rtsp-gstreamer feature".into(),
                });
            }
        }

        Err(CaptureError::Connection {
            address: address.to_string(),
            reason: "unsupported address scheme".into(),
        })
    }
}

/// Paces a finite source to a target rate and derives presentation
/// timestamps on that rate's clock.
pub(crate) struct Pacer {
    start: Option<Instant>,
    interval: Duration,
    ticks: u32,
}

impl Pacer {
    pub(crate) fn new(fps: u32) -> Self {
        Self {
            start: None,
            interval: Duration::from_nanos(1_000_000_000 / fps.max(1) as u64),
            ticks: 0,
        }
    }

    /// Sleep until the next frame is due. The first call returns at once.
    pub(crate) fn wait(&mut self) {
        let start = *self.start.get_or_insert_with(Instant::now);
        let due = start + self.interval * self.ticks;
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
        self.ticks = self.ticks.saturating_add(1);
    }

    pub(crate) fn pts_ns(&self, index: u64) -> u64 {
        index.saturating_mul(self.interval.as_nanos() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_scheme_is_fatal() {
        let err = DefaultConnector
            .connect("ftp://camera", &TransportOptions::default())
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }

    #[cfg(not(feature = "rtsp-gstreamer"))]
    #[test]
    fn rtsp_without_feature_is_a_connection_failure() {
        let err = DefaultConnector
            .connect("rtsp://10.0.0.2:8554/vis.0", &TransportOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::Connection { .. }));
    }

    #[test]
    fn stub_source_yields_frames() {
        let mut source = DefaultConnector
            .connect("stub://?frames=1&width=2&height=2", &TransportOptions::default())
            .unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn pacer_spaces_frames() {
        let mut pacer = Pacer::new(100);
        let start = Instant::now();
        for _ in 0..4 {
            pacer.wait();
        }
        assert!(start.elapsed() >= Duration::from_millis(29));
        assert_eq!(pacer.pts_ns(3), 30_000_000);
    }
}

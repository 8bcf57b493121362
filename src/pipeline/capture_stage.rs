//! Producer side: pull decoded frames, stamp them and hand them to the queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, trace};

use super::stats::FpsMeter;
use super::Shared;
use crate::capture::{Frame, FrameSource, SourceConnector, TransportOptions};
use crate::error::{CaptureError, ErrorKind};
use crate::utils;

#[derive(Debug, Clone)]
pub(crate) struct CaptureSettings {
    pub address: String,
    pub transport: TransportOptions,
    pub read_retry_backoff: Duration,
    pub fps_window: Duration,
    pub capture_core: Option<usize>,
}

pub(crate) struct CaptureStage {
    shared: Arc<Shared>,
    connector: Arc<dyn SourceConnector>,
    settings: CaptureSettings,
}

impl CaptureStage {
    pub(crate) fn new(
        shared: Arc<Shared>,
        connector: Arc<dyn SourceConnector>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            shared,
            connector,
            settings,
        }
    }

    #[instrument(name = "capture", skip_all, fields(address = %self.settings.address))]
    pub(crate) fn run(self) {
        if let Some(core) = self.settings.capture_core {
            utils::pin_current_thread(core);
        }

        let source = match self
            .connector
            .connect(&self.settings.address, &self.settings.transport)
        {
            Ok(source) => source,
            Err(err) => {
                // Nothing can be captured without a source, whatever the cause.
                self.shared.reporter.report(err.kind(), err.to_string(), true);
                return;
            }
        };
        info!("Connected to {}", source.describe());

        self.capture_loop(source);
        info!("Capture thread exiting");
    }

    /// Owns `source` so it is released on every exit path.
    fn capture_loop(&self, mut source: Box<dyn FrameSource>) {
        let shared = &self.shared;
        let mut sequence = 0u64;
        let mut fps = FpsMeter::new(self.settings.fps_window, Instant::now());
        let mut resolution = None;

        while !shared.stop_requested() {
            let decoded = match source.next_frame() {
                Ok(Some(decoded)) => decoded,
                Ok(None) => continue,
                Err(err @ CaptureError::Read(_)) => {
                    shared.reporter.report_capture(&err);
                    std::thread::sleep(self.settings.read_retry_backoff);
                    continue;
                }
                Err(err) => {
                    shared.reporter.report_capture(&err);
                    if err.is_fatal() {
                        break;
                    }
                    continue;
                }
            };

            let expected = decoded.width as usize * decoded.height as usize * 3;
            if decoded.width == 0 || decoded.height == 0 || decoded.rgb.len() != expected {
                shared.reporter.report(
                    ErrorKind::DecodeError,
                    format!(
                        "decoded {}x{} frame has {} bytes, expected {}",
                        decoded.width,
                        decoded.height,
                        decoded.rgb.len(),
                        expected
                    ),
                    false,
                );
                continue;
            }

            if resolution != Some((decoded.width, decoded.height)) {
                info!("Resolution: {}x{}", decoded.width, decoded.height);
                resolution = Some((decoded.width, decoded.height));
            }

            let frame = Frame::stamp(decoded, sequence, utils::unix_millis());
            sequence += 1;

            match shared.queue.push(frame) {
                Ok(()) => shared.stats.record_captured(),
                Err(dropped) => {
                    trace!(sequence = dropped.sequence, "queue full, dropping frame");
                    shared.stats.record_dropped();
                }
            }

            if let Some(rate) = fps.tick(Instant::now()) {
                shared.stats.publish_fps(rate);
                debug!(fps = rate, queued = shared.queue.len(), "capture rate");
            }
        }
    }
}

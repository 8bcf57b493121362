//! Synthetic frame source (`stub://`) for demos and tests.

use tracing::info;

use super::frame::DecodedFrame;
use super::source::FrameSource;
use super::Pacer;
use crate::error::CaptureError;

/// Shape of a synthetic stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticConfig {
    /// Stop with end-of-stream after this many frames; `None` runs forever.
    pub frames: Option<u64>,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Whether frames carry presentation timestamps.
    pub with_pts: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frames: None,
            fps: 30,
            width: 320,
            height: 240,
            with_pts: true,
        }
    }
}

impl SyntheticConfig {
    /// Parse the query part of a `stub://` address, e.g.
    /// `stub://?frames=100&fps=30&width=64&height=48&pts=0`.
    pub fn from_address(address: &str) -> Result<Self, CaptureError> {
        let mut config = Self::default();
        let query = match address.split_once('?') {
            Some((_, query)) => query,
            None => return Ok(config),
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let bad = || CaptureError::Connection {
                address: address.to_string(),
                reason: format!("invalid parameter {pair:?}"),
            };
            match key {
                "frames" => config.frames = Some(value.parse().map_err(|_| bad())?),
                "fps" => config.fps = value.parse().map_err(|_| bad())?,
                "width" => config.width = value.parse().map_err(|_| bad())?,
                "height" => config.height = value.parse().map_err(|_| bad())?,
                "pts" => config.with_pts = value != "0" && value != "false",
                _ => return Err(bad()),
            }
        }

        if config.fps == 0 || config.width == 0 || config.height == 0 {
            return Err(CaptureError::Connection {
                address: address.to_string(),
                reason: "fps, width and height must be positive".into(),
            });
        }
        Ok(config)
    }
}

/// Generates a moving gradient at a fixed rate.
pub struct SyntheticSource {
    config: SyntheticConfig,
    pacer: Pacer,
    emitted: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        info!(
            "Synthetic source: {}x{} @ {} fps",
            config.width, config.height, config.fps
        );
        Self {
            pacer: Pacer::new(config.fps),
            config,
            emitted: 0,
        }
    }

    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let shift = self.emitted as usize;
        let mut pixels = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                pixels.extend_from_slice(&[
                    ((x + shift) % 256) as u8,
                    ((y + shift) % 256) as u8,
                    (shift % 256) as u8,
                ]);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, CaptureError> {
        if self.config.frames.is_some_and(|limit| self.emitted >= limit) {
            return Err(CaptureError::EndOfStream);
        }

        self.pacer.wait();
        let frame = DecodedFrame {
            rgb: self.render(),
            width: self.config.width,
            height: self.config.height,
            pts_ns: self
                .config
                .with_pts
                .then(|| self.pacer.pts_ns(self.emitted)),
        };
        self.emitted += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!(
            "synthetic {}x{} @ {} fps",
            self.config.width, self.config.height, self.config.fps
        )
    }
}

//! Framesink: record a live camera stream to disk as still images.
//!
//! A single capture thread pulls decoded frames at the source rate, stamps
//! each with both the source's presentation time and the local receive
//! time, and offers it to a bounded queue. A pool of writer threads encodes
//! queued frames and publishes each as its own file. When the writers fall
//! behind, the newest frames are dropped instead of stalling capture.

pub mod capture;
pub mod error;
pub mod latency;
pub mod output;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use capture::TransportOptions;
use error::ConfigError;
use output::ImageFormat;

pub use error::{ErrorEvent, ErrorKind};
pub use pipeline::{Recorder, StatsSnapshot};

/// Environment variable prefix, e.g. `FRAMESINK_OUTPUT__QUALITY=90`.
pub const ENV_PREFIX: &str = "FRAMESINK";

/// Recorder configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// `rtsp://`, `file://<dir>` or `stub://`
    pub address: String,
    pub reliable_transport: bool, // TCP interleaved for RTSP
    pub max_delay_ms: u32,
    pub read_retry_backoff_ms: u64,
    pub replay_fps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub format: ImageFormat,
    pub quality: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub write_threads: usize,
    pub queue_capacity: usize,
    pub pop_timeout_ms: u64,
    pub fps_window_ms: u64,
    pub capture_core: Option<usize>, // CPU pinning for the capture thread
}

impl Default for SourceConfig {
    fn default() -> Self {
        let transport = TransportOptions::default();
        Self {
            address: "stub://".into(),
            reliable_transport: transport.reliable,
            max_delay_ms: transport.max_delay_ms,
            read_retry_backoff_ms: 10,
            replay_fps: transport.replay_fps,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            format: ImageFormat::Jpeg,
            quality: 85,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            write_threads: 4,
            queue_capacity: pipeline::queue::DEFAULT_CAPACITY,
            pop_timeout_ms: 100,
            fps_window_ms: 1000,
            capture_core: None,
        }
    }
}

impl Config {
    /// Layer an optional TOML file and `FRAMESINK_*` environment variables
    /// over the defaults, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::layered(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`] but without validation, for callers that apply
    /// further overrides first.
    pub fn layered(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.source.address.trim().is_empty() {
            return invalid("source.address must not be empty");
        }
        if self.pipeline.write_threads == 0 {
            return invalid("pipeline.write_threads must be at least 1");
        }
        if self.pipeline.queue_capacity == 0 {
            return invalid("pipeline.queue_capacity must be at least 1");
        }
        if !(1..=100).contains(&self.output.quality) {
            return invalid("output.quality must be within 1..=100");
        }
        if self.pipeline.pop_timeout_ms == 0 {
            return invalid("pipeline.pop_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn transport(&self) -> TransportOptions {
        TransportOptions {
            reliable: self.source.reliable_transport,
            max_delay_ms: self.source.max_delay_ms,
            replay_fps: self.source.replay_fps,
        }
    }
}

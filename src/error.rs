//! Error types and the pipeline's error reporting channel.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tracing::{error, warn};

use crate::utils;

/// Failures raised by frame sources, decoders and converters.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open source {address}: {reason}")]
    Connection { address: String, reason: String },

    #[error("no decodable video stream in {0}")]
    NoVideoStream(String),

    #[error("codec unusable: {0}")]
    Codec(String),

    #[error("failed to read from source: {0}")]
    Read(String),

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("source reached end of stream")]
    EndOfStream,
}

impl CaptureError {
    /// Whether the source can make further progress after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::NoVideoStream(_) | Self::Codec(_) | Self::EndOfStream
        )
    }

    /// Category this error is reported under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::NoVideoStream(_) => ErrorKind::ConnectionFailed,
            Self::Codec(_) | Self::Read(_) | Self::Decode(_) => ErrorKind::DecodeError,
            Self::EndOfStream => ErrorKind::Other,
        }
    }
}

/// Failures persisting a single frame.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to encode {width}x{height} frame: {reason}")]
    Encode {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("failed to write {path}: {source}")]
    Persist { path: PathBuf, source: io::Error },

    #[error("output file {0} already exists")]
    Exists(PathBuf),

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// Reasons `Recorder::start` refuses to run.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("recorder is already running")]
    AlreadyRunning,

    #[error("previous session has not been stopped")]
    NotStopped,

    #[error("failed to spawn {thread} thread: {source}")]
    Spawn { thread: String, source: io::Error },
}

/// Configuration load and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to create output directory {path}: {source}")]
    OutputDir { path: PathBuf, source: io::Error },
}

/// Category of a reported pipeline error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionFailed,
    DecodeError,
    WriteError,
    ThreadError,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::DecodeError => "FRAME_DECODE_ERROR",
            Self::WriteError => "WRITE_ERROR",
            Self::ThreadError => "THREAD_ERROR",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error delivered to the registered observer.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
    /// Nanoseconds since the Unix epoch when the error was raised.
    pub timestamp_ns: u64,
    pub fatal: bool,
}

/// Observer for pipeline errors.
///
/// Runs synchronously on whichever pipeline thread raised the error, and may
/// be entered concurrently by the capture thread and every writer. It must
/// not block for long and must not assume thread affinity.
pub type ErrorHandler = Box<dyn Fn(&ErrorEvent) + Send + Sync + 'static>;

/// Delivers error events to the observer and escalates fatal ones.
///
/// A fatal report clears the shared running flag; the owner is expected to
/// notice and call `stop()` to reclaim threads.
pub struct ErrorReporter {
    handler: ArcSwapOption<ErrorHandler>,
    running: Arc<AtomicBool>,
}

impl ErrorReporter {
    pub fn new(running: Arc<AtomicBool>) -> Self {
        Self {
            handler: ArcSwapOption::empty(),
            running,
        }
    }

    pub fn set_handler(&self, handler: ErrorHandler) {
        self.handler.store(Some(Arc::new(handler)));
    }

    pub fn report(&self, kind: ErrorKind, message: impl Into<String>, fatal: bool) {
        let event = ErrorEvent {
            kind,
            message: message.into(),
            timestamp_ns: utils::unix_nanos(),
            fatal,
        };

        if fatal {
            error!(kind = %event.kind, "{}", event.message);
        } else {
            warn!(kind = %event.kind, "{}", event.message);
        }
        metrics::counter!("framesink_errors_total", "kind" => kind.as_str()).increment(1);

        if let Some(handler) = self.handler.load_full() {
            handler(&event);
        }

        if fatal {
            self.running.store(false, Ordering::SeqCst);
        }
    }

    pub fn report_capture(&self, err: &CaptureError) {
        self.report(err.kind(), err.to_string(), err.is_fatal());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn fatal_report_clears_running_flag() {
        let running = Arc::new(AtomicBool::new(true));
        let reporter = ErrorReporter::new(running.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        reporter.set_handler(Box::new(move |event| {
            sink.lock().unwrap().push((event.kind, event.fatal));
        }));

        reporter.report(ErrorKind::WriteError, "disk full", false);
        assert!(running.load(Ordering::SeqCst));

        reporter.report(ErrorKind::ConnectionFailed, "refused", true);
        assert!(!running.load(Ordering::SeqCst));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (ErrorKind::WriteError, false),
                (ErrorKind::ConnectionFailed, true)
            ]
        );
    }

    #[test]
    fn report_without_handler_still_escalates() {
        let running = Arc::new(AtomicBool::new(true));
        let reporter = ErrorReporter::new(running.clone());
        reporter.report(ErrorKind::ThreadError, "spawn failed", true);
        assert!(!running.load(Ordering::SeqCst));
    }

    #[test]
    fn capture_errors_are_classified() {
        assert!(CaptureError::Codec("h264".into()).is_fatal());
        assert_eq!(
            CaptureError::Codec("h264".into()).kind(),
            ErrorKind::DecodeError
        );
        assert!(!CaptureError::Read("timeout".into()).is_fatal());
        assert!(!CaptureError::Decode("corrupt".into()).is_fatal());
        assert_eq!(
            CaptureError::NoVideoStream("rtsp://cam".into()).kind(),
            ErrorKind::ConnectionFailed
        );
        assert_eq!(CaptureError::EndOfStream.kind(), ErrorKind::Other);
    }
}

//! Capture-to-disk pipeline: one capture thread feeding a pool of writers
//! through a bounded queue.

pub mod capture_stage;
pub mod queue;
pub mod stats;
pub mod write_stage;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::capture::{DefaultConnector, SourceConnector};
use crate::error::{ConfigError, ErrorEvent, ErrorKind, ErrorReporter, StartError};
use crate::output::ImageEncoder;
use crate::{utils, Config};
use capture_stage::{CaptureSettings, CaptureStage};
use write_stage::{WriteStage, WriterSettings};

pub use queue::FrameQueue;
pub use stats::{Statistics, StatsSnapshot};

/// State shared by the controller and every pipeline thread.
pub(crate) struct Shared {
    pub(crate) queue: FrameQueue,
    pub(crate) stats: Statistics,
    pub(crate) reporter: ErrorReporter,
    running: Arc<AtomicBool>,
    stop_requested: AtomicBool,
}

impl Shared {
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

struct Session {
    capture: JoinHandle<()>,
    writers: Vec<JoinHandle<()>>,
}

/// Records a live source to disk, one image file per surviving frame.
///
/// ```no_run
/// use framesink::{Config, Recorder};
///
/// let mut config = Config::default();
/// config.source.address = "rtsp://169.254.50.183:8554/vis.0".into();
/// let recorder = Recorder::new(config)?;
/// recorder.set_error_callback(|e| eprintln!("{}: {}", e.kind, e.message));
/// recorder.start()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// Dropping the recorder stops it.
pub struct Recorder {
    shared: Arc<Shared>,
    connector: Arc<dyn SourceConnector>,
    encoder: Arc<dyn ImageEncoder>,
    capture_settings: CaptureSettings,
    writer_settings: Arc<WriterSettings>,
    write_threads: usize,
    session: Mutex<Option<Session>>,
}

impl Recorder {
    /// Recorder using the built-in connectors and the configured encoder.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let encoder: Arc<dyn ImageEncoder> = Arc::from(config.output.format.encoder());
        Self::with_components(config, Arc::new(DefaultConnector), encoder)
    }

    /// Recorder with caller-supplied source connector and image encoder.
    /// Creates the output directory if it is missing.
    pub fn with_components(
        config: Config,
        connector: Arc<dyn SourceConnector>,
        encoder: Arc<dyn ImageEncoder>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        utils::ensure_output_dir(&config.output.directory)?;

        let running = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Shared {
            queue: FrameQueue::new(config.pipeline.queue_capacity),
            stats: Statistics::default(),
            reporter: ErrorReporter::new(running.clone()),
            running,
            stop_requested: AtomicBool::new(false),
        });

        Ok(Self {
            shared,
            connector,
            encoder,
            capture_settings: CaptureSettings {
                address: config.source.address.clone(),
                transport: config.transport(),
                read_retry_backoff: Duration::from_millis(config.source.read_retry_backoff_ms),
                fps_window: Duration::from_millis(config.pipeline.fps_window_ms),
                capture_core: config.pipeline.capture_core,
            },
            writer_settings: Arc::new(WriterSettings {
                directory: config.output.directory.clone(),
                quality: config.output.quality,
                pop_timeout: Duration::from_millis(config.pipeline.pop_timeout_ms),
            }),
            write_threads: config.pipeline.write_threads,
            session: Mutex::new(None),
        })
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the capture thread and the writer pool.
    ///
    /// At most one concurrent caller succeeds. A session that ended on a
    /// fatal error must be reaped with [`Recorder::stop`] before starting
    /// again.
    pub fn start(&self) -> Result<(), StartError> {
        let mut session = self.lock_session();
        if session.is_some() {
            return Err(if self.is_running() {
                StartError::AlreadyRunning
            } else {
                StartError::NotStopped
            });
        }
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StartError::AlreadyRunning);
        }
        self.shared.stop_requested.store(false, Ordering::SeqCst);

        match self.spawn_session() {
            Ok(spawned) => {
                *session = Some(spawned);
                info!(
                    writers = self.write_threads,
                    address = %self.capture_settings.address,
                    "Recorder started"
                );
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared
                    .reporter
                    .report(ErrorKind::ThreadError, format!("Failed to start threads: {}", err), true);
                Err(err)
            }
        }
    }

    fn spawn_session(&self) -> Result<Session, StartError> {
        let stage = CaptureStage::new(
            self.shared.clone(),
            self.connector.clone(),
            self.capture_settings.clone(),
        );
        let capture = thread::Builder::new()
            .name("framesink-capture".into())
            .spawn(move || stage.run())
            .map_err(|source| StartError::Spawn {
                thread: "capture".into(),
                source,
            })?;

        let mut writers = Vec::with_capacity(self.write_threads);
        for id in 0..self.write_threads {
            let stage = WriteStage::new(
                id,
                self.shared.clone(),
                self.encoder.clone(),
                self.writer_settings.clone(),
            );
            match thread::Builder::new()
                .name(format!("framesink-writer-{}", id))
                .spawn(move || stage.run())
            {
                Ok(handle) => writers.push(handle),
                Err(source) => {
                    // Unwind the partial session before reporting.
                    self.shared.stop_requested.store(true, Ordering::SeqCst);
                    self.join_session(Session { capture, writers });
                    return Err(StartError::Spawn {
                        thread: format!("writer {}", id),
                        source,
                    });
                }
            }
        }

        Ok(Session { capture, writers })
    }

    /// Request every thread to exit and wait for them: the capture thread
    /// first, then each writer. Frames still queued once the writers have
    /// drained are discarded.
    ///
    /// Blocks until no pipeline thread remains. Must not be called from the
    /// error callback, which runs on a pipeline thread.
    pub fn stop(&self) {
        let mut session = self.lock_session();
        let Some(active) = session.take() else {
            return;
        };

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        self.join_session(active);
        info!(stats = ?self.stats(), "Recorder stopped");
    }

    fn join_session(&self, session: Session) {
        if session.capture.join().is_err() {
            self.shared
                .reporter
                .report(ErrorKind::ThreadError, "capture thread panicked", false);
        }
        for (id, writer) in session.writers.into_iter().enumerate() {
            if writer.join().is_err() {
                self.shared.reporter.report(
                    ErrorKind::ThreadError,
                    format!("writer {} panicked", id),
                    false,
                );
            }
        }

        let abandoned = self.shared.queue.clear();
        if abandoned > 0 {
            debug!(abandoned, "Discarded queued frames at shutdown");
        }
    }

    /// True between a successful `start` and `stop`, or until a fatal error.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// True once a stop has been requested for the current session.
    pub fn is_stop_requested(&self) -> bool {
        self.shared.stop_requested()
    }

    /// Lock-free snapshot of the counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Current queue depth (advisory).
    pub fn queued_frames(&self) -> usize {
        self.shared.queue.len()
    }

    /// Register the error observer, replacing any previous one.
    ///
    /// The handler runs synchronously on the capture thread or a writer
    /// thread, possibly on several at once; it must be quick and must not
    /// call [`Recorder::stop`].
    pub fn set_error_callback<F>(&self, handler: F)
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.shared.reporter.set_handler(Box::new(handler));
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}

#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use framesink::capture::{
    DecodedFrame, DefaultConnector, FrameSource, SourceConnector, TransportOptions,
};
use framesink::error::{CaptureError, WriteError};
use framesink::output::{ImageEncoder, JpegEncoder};
use framesink::{Config, ErrorEvent, Recorder, StatsSnapshot};

pub fn config(address: &str, dir: &Path) -> Config {
    let mut config = Config::default();
    config.source.address = address.to_string();
    config.output.directory = dir.to_path_buf();
    config
}

/// Poll `stats` until `done` holds or `timeout` elapses.
pub fn wait_for(
    recorder: &Recorder,
    timeout: Duration,
    done: impl Fn(&StatsSnapshot) -> bool,
) -> StatsSnapshot {
    let deadline = Instant::now() + timeout;
    loop {
        let stats = recorder.stats();
        if done(&stats) || Instant::now() >= deadline {
            return stats;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

pub fn wait_until(timeout: Duration, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

pub fn output_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

/// Collects every reported error event.
#[derive(Clone, Default)]
pub struct ErrorLog(Arc<Mutex<Vec<ErrorEvent>>>);

impl ErrorLog {
    pub fn attach(&self, recorder: &Recorder) {
        let events = self.0.clone();
        recorder.set_error_callback(move |event| events.lock().unwrap().push(event.clone()));
    }

    pub fn events(&self) -> Vec<ErrorEvent> {
        self.0.lock().unwrap().clone()
    }
}

/// JPEG encoder that tracks how many encodes are in flight and can be
/// slowed down or held at a gate.
pub struct InstrumentedEncoder {
    delay: Duration,
    gate: Mutex<bool>,
    gate_cv: Condvar,
    pub in_flight: AtomicUsize,
    pub completed: AtomicUsize,
}

impl InstrumentedEncoder {
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            gate: Mutex::new(true),
            gate_cv: Condvar::new(),
            in_flight: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        })
    }

    pub fn gated() -> Arc<Self> {
        let encoder = Self::with_delay(Duration::ZERO);
        *encoder.gate.lock().unwrap() = false;
        encoder
    }

    pub fn open_gate(&self) {
        *self.gate.lock().unwrap() = true;
        self.gate_cv.notify_all();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl ImageEncoder for InstrumentedEncoder {
    fn encode(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
        quality: u8,
        out: &mut dyn Write,
    ) -> Result<(), WriteError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        {
            let open = self.gate.lock().unwrap();
            let _open = self.gate_cv.wait_while(open, |open| !*open).unwrap();
        }
        std::thread::sleep(self.delay);
        let result = JpegEncoder.encode(rgb, width, height, quality, out);
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }
}

/// Encoder that always fails.
pub struct BrokenEncoder;

impl ImageEncoder for BrokenEncoder {
    fn encode(
        &self,
        _rgb: &[u8],
        width: u32,
        height: u32,
        _quality: u8,
        _out: &mut dyn Write,
    ) -> Result<(), WriteError> {
        Err(WriteError::Encode {
            width,
            height,
            reason: "encoder offline".into(),
        })
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }
}

/// Default connector that counts how many sessions opened a source.
#[derive(Default)]
pub struct CountingConnector {
    pub connects: AtomicUsize,
}

impl SourceConnector for CountingConnector {
    fn connect(
        &self,
        address: &str,
        options: &TransportOptions,
    ) -> Result<Box<dyn FrameSource>, CaptureError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        DefaultConnector.connect(address, options)
    }
}

/// Connector whose source can never be reached.
pub struct UnreachableConnector;

impl SourceConnector for UnreachableConnector {
    fn connect(
        &self,
        address: &str,
        _options: &TransportOptions,
    ) -> Result<Box<dyn FrameSource>, CaptureError> {
        Err(CaptureError::Connection {
            address: address.to_string(),
            reason: "connection refused".into(),
        })
    }
}

/// One scripted step of a [`ScriptedSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Frame,
    ReadError,
    DecodeError,
    WrongSize,
    CodecError,
}

/// Plays `steps` once, then idles with `Ok(None)`.
pub struct ScriptedSource {
    steps: std::vec::IntoIter<Step>,
    emitted: u64,
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, CaptureError> {
        let Some(step) = self.steps.next() else {
            std::thread::sleep(Duration::from_millis(5));
            return Ok(None);
        };
        match step {
            Step::Frame => {
                self.emitted += 1;
                Ok(Some(DecodedFrame {
                    rgb: vec![128; 4 * 2 * 3],
                    width: 4,
                    height: 2,
                    pts_ns: Some(self.emitted * 33_333_333),
                }))
            }
            Step::WrongSize => Ok(Some(DecodedFrame {
                rgb: vec![0; 7],
                width: 4,
                height: 2,
                pts_ns: None,
            })),
            Step::ReadError => Err(CaptureError::Read("socket timed out".into())),
            Step::DecodeError => Err(CaptureError::Decode("corrupt slice".into())),
            Step::CodecError => Err(CaptureError::Codec("decoder lost".into())),
        }
    }
}

/// Connector handing every session a fresh [`ScriptedSource`].
pub struct ScriptedConnector(pub Vec<Step>);

impl SourceConnector for ScriptedConnector {
    fn connect(
        &self,
        _address: &str,
        _options: &TransportOptions,
    ) -> Result<Box<dyn FrameSource>, CaptureError> {
        Ok(Box::new(ScriptedSource {
            steps: self.0.clone().into_iter(),
            emitted: 0,
        }))
    }
}

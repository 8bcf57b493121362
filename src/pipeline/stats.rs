use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;

/// Live pipeline counters.
///
/// Each field is independently atomic and written by exactly one kind of
/// thread, so readers never need a lock. A snapshot may mix values from
/// slightly different instants.
#[derive(Debug, Default)]
pub struct Statistics {
    captured: CachePadded<AtomicU64>,
    written: CachePadded<AtomicU64>,
    dropped: CachePadded<AtomicU64>,
    /// `f32` bits of the current frame rate.
    fps_bits: AtomicU32,
}

/// Point-in-time copy of [`Statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    pub captured_frames: u64,
    pub written_frames: u64,
    pub dropped_frames: u64,
    pub current_fps: f32,
}

impl StatsSnapshot {
    /// Frames the capture stage has handled so far, queued or dropped.
    pub fn processed_frames(&self) -> u64 {
        self.captured_frames + self.dropped_frames
    }
}

impl Statistics {
    pub(crate) fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framesink_frames_captured_total").increment(1);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framesink_frames_dropped_total").increment(1);
    }

    pub(crate) fn record_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framesink_frames_written_total").increment(1);
    }

    pub(crate) fn publish_fps(&self, fps: f32) {
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
        metrics::gauge!("framesink_capture_fps").set(fps as f64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            captured_frames: self.captured.load(Ordering::Relaxed),
            written_frames: self.written.load(Ordering::Relaxed),
            dropped_frames: self.dropped.load(Ordering::Relaxed),
            current_fps: f32::from_bits(self.fps_bits.load(Ordering::Relaxed)),
        }
    }
}

/// Windowed frame-rate estimate for the capture loop.
#[derive(Debug)]
pub struct FpsMeter {
    window: Duration,
    window_start: Instant,
    frames: u64,
}

impl FpsMeter {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            window_start: now,
            frames: 0,
        }
    }

    /// Count one frame. Once a full window has elapsed, returns the rate
    /// over it and starts a new window.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let fps = self.frames as f32 * 1000.0 / elapsed.as_millis() as f32;
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = Statistics::default();
        stats.record_captured();
        stats.record_captured();
        stats.record_dropped();
        stats.record_written();
        stats.publish_fps(29.5);

        let snap = stats.snapshot();
        assert_eq!(snap.captured_frames, 2);
        assert_eq!(snap.dropped_frames, 1);
        assert_eq!(snap.written_frames, 1);
        assert_eq!(snap.processed_frames(), 3);
        assert_eq!(snap.current_fps, 29.5);
    }

    #[test]
    fn fps_published_once_per_window() {
        let start = Instant::now();
        let mut meter = FpsMeter::new(Duration::from_millis(1000), start);

        for i in 1..30 {
            assert_eq!(meter.tick(start + Duration::from_millis(i * 33)), None);
        }
        let fps = meter.tick(start + Duration::from_millis(1000)).unwrap();
        assert_eq!(fps, 30.0);

        // Window restarted at t=1000ms.
        assert_eq!(meter.tick(start + Duration::from_millis(1500)), None);
        let fps = meter.tick(start + Duration::from_millis(2000)).unwrap();
        assert_eq!(fps, 2.0);
    }

    #[test]
    fn slow_windows_use_actual_elapsed_time() {
        let start = Instant::now();
        let mut meter = FpsMeter::new(Duration::from_millis(1000), start);
        let fps = meter.tick(start + Duration::from_millis(4000)).unwrap();
        assert_eq!(fps, 0.25);
    }
}

//! Bounded hand-off queue between the capture thread and the writers

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

use crate::capture::Frame;

/// Default number of frames held between capture and the writers.
pub const DEFAULT_CAPACITY: usize = 15;

/// Fixed-capacity FIFO of frames.
///
/// The producer never blocks: a push into a full queue hands the frame
/// straight back (drop newest). Consumers block on [`FrameQueue::pop`] up to
/// a timeout and are woken one per successful push.
pub struct FrameQueue {
    ring: Mutex<HeapRb<Frame>>,
    available: Condvar,
}

impl FrameQueue {
    /// Capacity is clamped to at least one frame.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(HeapRb::new(capacity.max(1))),
            available: Condvar::new(),
        }
    }

    // A writer that panicked mid-pop cannot leave the ring inconsistent, so
    // a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HeapRb<Frame>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer: enqueue without blocking. A full queue returns the frame
    /// in `Err` for the caller to drop and count.
    pub fn push(&self, frame: Frame) -> Result<(), Frame> {
        let pushed = self.lock().try_push(frame);
        if pushed.is_ok() {
            self.available.notify_one();
        }
        pushed
    }

    /// Consumer: take the oldest frame, waiting up to `timeout` for one to
    /// arrive.
    pub fn pop(&self, timeout: Duration) -> Option<Frame> {
        let guard = self.lock();
        let (mut guard, _) = self
            .available
            .wait_timeout_while(guard, timeout, |ring| ring.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        guard.try_pop()
    }

    /// Snapshot of the current length; stale as soon as it returns.
    pub fn len(&self) -> usize {
        self.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity().get()
    }

    /// Drop everything still queued. Teardown only.
    pub fn clear(&self) -> usize {
        let mut ring = self.lock();
        let mut cleared = 0;
        while ring.try_pop().is_some() {
            cleared += 1;
        }
        cleared
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

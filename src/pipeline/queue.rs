//! Bounded hand-off between the driver's capture callback and the
//! publishing thread.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::capture::FramePtr;
use crate::pipeline::status::FrameCounters;
use crate::utils::lock;

/// Frames buffered between capture and publish
pub const QUEUE_CAPACITY: usize = 2;

/// Longest a waiting consumer sleeps before re-checking for shutdown
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Slots {
    frames: VecDeque<FramePtr>,
    running: bool,
}

/// FIFO of at most [`QUEUE_CAPACITY`] frames.
///
/// The producer never waits: when the queue is full the new frame is
/// dropped and counted. The single consumer blocks in [`take`](Self::take).
#[derive(Debug)]
pub struct AcquisitionQueue {
    slots: Mutex<Slots>,
    ready: Condvar,
    capacity: usize,
    counters: Arc<FrameCounters>,
}

impl AcquisitionQueue {
    pub fn new(counters: Arc<FrameCounters>) -> Self {
        Self::with_capacity(QUEUE_CAPACITY, counters)
    }

    pub fn with_capacity(capacity: usize, counters: Arc<FrameCounters>) -> Self {
        Self {
            slots: Mutex::new(Slots {
                frames: VecDeque::with_capacity(capacity),
                running: true,
            }),
            ready: Condvar::new(),
            capacity,
            counters,
        }
    }

    /// Producer: enqueue `frame`, or drop it if the queue is full.
    /// Returns whether the frame was queued.
    pub fn offer(&self, frame: FramePtr) -> bool {
        let mut slots = lock(&self.slots);
        if !slots.running {
            return false;
        }
        if slots.frames.len() < self.capacity {
            slots.frames.push_back(frame);
            self.ready.notify_all();
            true
        } else {
            self.counters.record_drop();
            false
        }
    }

    /// Consumer: remove the oldest frame, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout or once the queue has been shut down.
    /// Waits are cut into [`POLL_INTERVAL`] slices.
    pub fn take(&self, timeout: Duration) -> Option<FramePtr> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slots = lock(&self.slots);
        loop {
            if !slots.running {
                return None;
            }
            if let Some(frame) = slots.frames.pop_front() {
                return Some(frame);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    (deadline - now).min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };
            slots = self
                .ready
                .wait_timeout(slots, wait)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| PoisonError::into_inner(e).0);
        }
    }

    /// Stop accepting frames and wake the consumer
    pub fn shutdown(&self) {
        let mut slots = lock(&self.slots);
        slots.running = false;
        slots.frames.clear();
        self.ready.notify_all();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.slots).running
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self) -> &Arc<FrameCounters> {
        &self.counters
    }
}

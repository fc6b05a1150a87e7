//! Frame counters and the periodic status line.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::utils::CachePadded;
use flume::{Receiver, RecvTimeoutError};
use tracing::{info, warn};

use crate::capture::Driver;
use crate::utils::lock;

/// Cadence of the status line
pub const STATUS_PERIOD: Duration = Duration::from_secs(5);

/// Dropped and published frame counts since the last report.
///
/// Increments are relaxed; a report racing an increment may attribute it
/// to the next period.
#[derive(Debug, Default)]
pub struct FrameCounters {
    stats: CachePadded<Stats>,
}

#[derive(Debug, Default)]
struct Stats {
    dropped: AtomicU64,
    published: AtomicU64,
}

impl FrameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_drop(&self) {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("camera_bridge_frames_dropped_total").increment(1);
    }

    pub fn record_publish(&self) {
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("camera_bridge_frames_published_total").increment(1);
    }

    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.stats.published.load(Ordering::Relaxed)
    }

    /// Read and reset both counters: `(published, dropped)`
    pub fn take(&self) -> (u64, u64) {
        (
            self.stats.published.swap(0, Ordering::Relaxed),
            self.stats.dropped.swap(0, Ordering::Relaxed),
        )
    }
}

/// One status line worth of numbers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    /// Frames per second arriving from the camera
    pub input_rate: f64,
    /// Frames per second published
    pub output_rate: f64,
    /// Dropped frames per published frame, 0 when nothing was published
    pub drop_ratio: f64,
}

impl StatusReport {
    pub fn compute(published: u64, dropped: u64, elapsed: Duration, input_rate: f64) -> Self {
        let secs = elapsed.as_secs_f64().max(1e-9);
        let drop_ratio = if published > 0 {
            dropped as f64 / published as f64
        } else {
            0.0
        };
        Self {
            input_rate,
            output_rate: published as f64 / secs,
            drop_ratio,
        }
    }
}

/// Turns the counters into a status line every [`STATUS_PERIOD`]
pub struct StatusReporter {
    counters: Arc<FrameCounters>,
    serial: String,
    driver: Option<Arc<dyn Driver>>,
    last_tick: Instant,
}

impl StatusReporter {
    pub fn new(counters: Arc<FrameCounters>, serial: impl Into<String>) -> Self {
        Self {
            counters,
            serial: serial.into(),
            driver: None,
            last_tick: Instant::now(),
        }
    }

    pub fn attach(&mut self, driver: Arc<dyn Driver>) {
        self.driver = Some(driver);
    }

    pub fn detach(&mut self) {
        self.driver = None;
    }

    /// Report and reset the counters. With no driver attached only a
    /// warning is logged and the counters are left alone.
    pub fn tick(&mut self) -> Option<StatusReport> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<StatusReport> {
        let Some(driver) = &self.driver else {
            warn!("camera {} is not online!", self.serial);
            return None;
        };
        let (published, dropped) = self.counters.take();
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;

        let report = StatusReport::compute(published, dropped, elapsed, driver.receive_frame_rate());
        info!(
            "frame rate in: {:.2} Hz, out: {:.2} Hz, drop: {:.1}%",
            report.input_rate,
            report.output_rate,
            report.drop_ratio * 100.0
        );
        metrics::gauge!("camera_bridge_output_rate_hz").set(report.output_rate);
        metrics::gauge!("camera_bridge_drop_ratio").set(report.drop_ratio);
        Some(report)
    }
}

/// Run `reporter` every `period` until `cancel` fires or its sender is
/// dropped.
pub fn spawn_status_timer(
    reporter: Arc<Mutex<StatusReporter>>,
    period: Duration,
    cancel: Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("status".into())
        .spawn(move || loop {
            match cancel.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {
                    lock(&reporter).tick();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })
}

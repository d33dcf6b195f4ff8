//! Progress reporting.
//!
//! This module provides [`ProgressCallback`] for monitoring frame delivery and
//! [`ProgressInfo`] for detailed progress snapshots.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framepipe::{PipeOptions, Pipeline, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             eprintln!("{pct:.1}% ({:.1} fps)", info.frames_per_second);
//!         }
//!     }
//! }
//!
//! let options = PipeOptions::new("clip.y4m").with_progress(Arc::new(PrintProgress));
//! let report = Pipeline::new(options).run();
//! std::process::exit(report.exit_code);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// A snapshot of delivery progress.
///
/// Delivered to [`ProgressCallback::on_progress`] at a cadence controlled by
/// [`PipeOptions::with_batch_size`](crate::PipeOptions::with_batch_size).
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frames handed to the pipe writer so far.
    pub current: u64,
    /// Frames expected in total.
    pub total: Option<u64>,
    /// Completion percentage (0.0 to 100.0), if `total` is known and non-zero.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since streaming started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Average delivery rate so far.
    pub frames_per_second: f64,
    /// The source frame number most recently delivered.
    pub current_frame: Option<u64>,
}

/// Trait for receiving progress updates while frames are streamed.
///
/// Implementations must be [`Send`] and [`Sync`]: the drain notification is
/// issued while the background writer thread is still running.
///
/// Progress callbacks are **infallible**: they observe but cannot halt the
/// run.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals while frames are delivered.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called once per poll interval while the buffered writer drains.
    ///
    /// `pending` is the number of frames handed over but not yet written.
    fn on_drain(&self, pending: usize) {
        let _ = pending;
    }

    /// Called once after the last [`on_drain`](Self::on_drain), when the
    /// buffered writer has stopped.
    fn on_drained(&self) {}
}

/// Internal helper that tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
    last_frame: Option<u64>,
}

impl ProgressTracker {
    /// Create a new tracker.
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: Option<u64>, batch_size: u64) -> Self {
        Self {
            callback,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
            last_frame: None,
        }
    }

    /// Record one delivered frame and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self, frame_number: u64) {
        self.current += 1;
        self.items_since_last_report += 1;
        self.last_frame = Some(frame_number);

        if self.items_since_last_report >= self.batch_size {
            self.report();
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final progress report.
    pub(crate) fn finish(&mut self) {
        self.report();
    }

    pub(crate) fn callback(&self) -> &Arc<dyn ProgressCallback> {
        &self.callback
    }

    fn report(&self) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                elapsed.mul_f64(remaining as f64 / self.current as f64)
            })
        } else {
            None
        };

        let seconds = elapsed.as_secs_f64();
        let frames_per_second = if seconds > 0.0 {
            self.current as f64 / seconds
        } else {
            0.0
        };

        let info = ProgressInfo {
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            frames_per_second,
            current_frame: self.last_frame,
        };

        self.callback.on_progress(&info);
    }
}

//! Run configuration.
//!
//! [`PipeOptions`] is a builder that collects everything one run needs: the
//! input, the encoder invocation, the frame range request, CPU affinity, the
//! delivery strategy and progress reporting.
//!
//! # Example
//!
//! ```no_run
//! use framepipe::{DeliveryMode, PipeOptions, SeekMode};
//!
//! let options = PipeOptions::new("clip.y4m")
//!     .with_encoder_args(["--crf", "18", "--output", "clip.264"])
//!     .with_seek(200)
//!     .with_frames(300)
//!     .with_seek_mode(SeekMode::Safe)
//!     .with_delivery(DeliveryMode::Buffered { capacity: Some(64) });
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::affinity::AffinityMask;
use crate::command::has_flag;
use crate::planner::{RangeRequest, SeekMode};
use crate::progress::ProgressCallback;
use crate::writer::DEFAULT_DRAIN_POLL_INTERVAL;

/// Encoder binary used when none is configured.
pub const DEFAULT_ENCODER: &str = "x264";

/// Memory the buffered writer may hold in queued frames by default.
const BUFFER_BUDGET_BYTES: usize = 1 << 30;
/// Bounds for the derived default queue capacity.
const MIN_BUFFER_FRAMES: usize = 8;
const MAX_BUFFER_FRAMES: usize = 2048;

/// How frame payloads reach the encoder's pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Write on the streaming thread.
    #[default]
    Direct,
    /// Queue frames for a background writer thread.
    Buffered {
        /// Queue capacity in frames. `None` derives one from the frame size
        /// with [`default_buffer_capacity`].
        capacity: Option<usize>,
    },
}

impl DeliveryMode {
    /// Resolve the queue capacity for frames of `frame_size` bytes.
    ///
    /// Returns `None` for [`DeliveryMode::Direct`].
    pub fn capacity_for(self, frame_size: usize) -> Option<usize> {
        match self {
            DeliveryMode::Direct => None,
            DeliveryMode::Buffered { capacity } => {
                Some(capacity.unwrap_or_else(|| default_buffer_capacity(frame_size)).max(1))
            }
        }
    }
}

/// Default queue capacity for frames of `frame_size` bytes: as many frames
/// as fit in 1 GiB, kept within 8..=2048.
///
/// ```
/// use framepipe::default_buffer_capacity;
///
/// assert_eq!(default_buffer_capacity(1920 * 1080 * 3 / 2), 345);
/// assert_eq!(default_buffer_capacity(0), 2048);
/// ```
pub fn default_buffer_capacity(frame_size: usize) -> usize {
    BUFFER_BUDGET_BYTES
        .checked_div(frame_size)
        .unwrap_or(MAX_BUFFER_FRAMES)
        .clamp(MIN_BUFFER_FRAMES, MAX_BUFFER_FRAMES)
}

/// Options for one [`Pipeline`](crate::Pipeline) run.
///
/// All fields have defaults except the input path; a default-constructed
/// config streams the whole input into `x264` with direct writes.
#[derive(Clone)]
pub struct PipeOptions {
    pub(crate) input: PathBuf,
    pub(crate) encoder: String,
    pub(crate) encoder_args: Vec<String>,
    pub(crate) seek: u64,
    pub(crate) frames: u64,
    pub(crate) seek_mode: SeekMode,
    pub(crate) timecode_file: Option<PathBuf>,
    pub(crate) qp_file: Option<PathBuf>,
    pub(crate) encoder_affinity: Option<AffinityMask>,
    pub(crate) process_affinity: Option<AffinityMask>,
    pub(crate) delivery: DeliveryMode,
    pub(crate) drain_poll_interval: Duration,
    pub(crate) progress: Option<Arc<dyn ProgressCallback>>,
    pub(crate) batch_size: u64,
}

impl Debug for PipeOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipeOptions")
            .field("input", &self.input)
            .field("encoder", &self.encoder)
            .field("encoder_args", &self.encoder_args)
            .field("seek", &self.seek)
            .field("frames", &self.frames)
            .field("seek_mode", &self.seek_mode)
            .field("timecode_file", &self.timecode_file)
            .field("qp_file", &self.qp_file)
            .field("encoder_affinity", &self.encoder_affinity)
            .field("process_affinity", &self.process_affinity)
            .field("delivery", &self.delivery)
            .field("has_progress", &self.progress.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self::new(PathBuf::new())
    }
}

impl PipeOptions {
    /// Create options for streaming `input` with default settings.
    pub fn new<P: AsRef<Path>>(input: P) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            encoder: DEFAULT_ENCODER.to_string(),
            encoder_args: Vec::new(),
            seek: 0,
            frames: 0,
            seek_mode: SeekMode::Fast,
            timecode_file: None,
            qp_file: None,
            encoder_affinity: None,
            process_affinity: None,
            delivery: DeliveryMode::Direct,
            drain_poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
            progress: None,
            batch_size: 1,
        }
    }

    /// Set the encoder binary.
    #[must_use]
    pub fn with_encoder<S: Into<String>>(mut self, program: S) -> Self {
        self.encoder = program.into();
        self
    }

    /// Set the arguments passed through to the encoder, before the ones
    /// generated from the source.
    #[must_use]
    pub fn with_encoder_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encoder_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// First frame to encode.
    #[must_use]
    pub fn with_seek(mut self, seek: u64) -> Self {
        self.seek = seek;
        self
    }

    /// Number of frames to encode; `0` encodes to the end of the source.
    #[must_use]
    pub fn with_frames(mut self, frames: u64) -> Self {
        self.frames = frames;
        self
    }

    /// Choose how frames before the seek point are skipped.
    #[must_use]
    pub fn with_seek_mode(mut self, mode: SeekMode) -> Self {
        self.seek_mode = mode;
        self
    }

    /// Pass a timecode file to the encoder. Forces frames before the seek
    /// point to be delivered.
    #[must_use]
    pub fn with_timecode_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.timecode_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Pass a quantizer-parameter file to the encoder. Forces frames before
    /// the seek point to be delivered.
    #[must_use]
    pub fn with_qp_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.qp_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Pin the encoder process to `mask`.
    #[must_use]
    pub fn with_encoder_affinity(mut self, mask: AffinityMask) -> Self {
        self.encoder_affinity = Some(mask);
        self
    }

    /// Pin this process to `mask` before the source is opened.
    #[must_use]
    pub fn with_process_affinity(mut self, mask: AffinityMask) -> Self {
        self.process_affinity = Some(mask);
        self
    }

    /// Choose the delivery strategy.
    #[must_use]
    pub fn with_delivery(mut self, mode: DeliveryMode) -> Self {
        self.delivery = mode;
        self
    }

    /// Set how often the buffered writer is polled while draining.
    #[must_use]
    pub fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = interval;
        self
    }

    /// Attach a progress callback.
    ///
    /// The callback is invoked every
    /// [`batch_size`](PipeOptions::with_batch_size) delivered frames.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// The input path.
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// The encoder binary.
    pub fn encoder(&self) -> &str {
        &self.encoder
    }

    /// The passthrough encoder arguments.
    pub fn encoder_args(&self) -> &[String] {
        &self.encoder_args
    }

    /// The delivery strategy.
    pub fn delivery(&self) -> DeliveryMode {
        self.delivery
    }

    /// The planner input described by these options.
    ///
    /// Metadata files count whether they were configured here or passed
    /// straight through in the encoder arguments.
    pub fn range_request(&self) -> RangeRequest {
        RangeRequest::new(self.seek, self.frames)
            .with_seek_mode(self.seek_mode)
            .with_timecode_file(
                self.timecode_file.is_some() || has_flag(&self.encoder_args, "--tcfile-in"),
            )
            .with_qp_file(self.qp_file.is_some() || has_flag(&self.encoder_args, "--qpfile"))
    }
}

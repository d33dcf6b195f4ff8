//! Frame range planning.
//!
//! Turns the user's seek offset and frame count into the concrete range of
//! source frames to deliver, and decides whether frames before the seek point
//! are skipped by the source ("fast") or delivered and skipped by the encoder
//! ("safe").
//!
//! # Example
//!
//! ```
//! use framepipe::{RangeRequest, SeekMode, SkipStrategy, plan_range};
//!
//! let request = RangeRequest::new(200, 300).with_seek_mode(SeekMode::Safe);
//! let plan = plan_range(&request, 1000);
//!
//! assert_eq!(plan.range.start_frame, 0);
//! assert_eq!(plan.range.total_frame, 500);
//! assert_eq!(plan.strategy, SkipStrategy::EncoderSeek { frames: 200 });
//! ```

/// How frames before the seek point are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekMode {
    /// Start decoding at the seek point unless per-frame metadata files force
    /// full delivery.
    #[default]
    Fast,
    /// Always deliver every frame from zero and let the encoder skip.
    Safe,
}

/// What a [`RangePlan`] does with the frames before the requested seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipStrategy {
    /// Nothing to skip: the seek was zero.
    None,
    /// The source starts producing at the seek point.
    SourceSeek {
        /// Frames skipped by never requesting them from the source.
        frames: u64,
    },
    /// Every frame from zero is delivered; the encoder is told to seek.
    EncoderSeek {
        /// Value for the encoder's `--seek` argument.
        frames: u64,
    },
}

/// Planner input: what the user asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeRequest {
    /// First frame the user wants encoded.
    pub seek: u64,
    /// Number of frames to encode; `0` means "to the end".
    pub frames: u64,
    /// A timecode file is passed to the encoder.
    pub timecode_file: bool,
    /// A quantizer-parameter file is passed to the encoder.
    pub qp_file: bool,
    /// Requested seek mode.
    pub seek_mode: SeekMode,
}

impl RangeRequest {
    /// A fast-mode request without per-frame metadata files.
    pub fn new(seek: u64, frames: u64) -> Self {
        Self {
            seek,
            frames,
            ..Self::default()
        }
    }

    /// Set the seek mode.
    #[must_use]
    pub fn with_seek_mode(mut self, mode: SeekMode) -> Self {
        self.seek_mode = mode;
        self
    }

    /// Mark that a timecode file is in use.
    #[must_use]
    pub fn with_timecode_file(mut self, present: bool) -> Self {
        self.timecode_file = present;
        self
    }

    /// Mark that a qp file is in use.
    #[must_use]
    pub fn with_qp_file(mut self, present: bool) -> Self {
        self.qp_file = present;
        self
    }

    /// `true` when frame indices must stay aligned with external per-frame
    /// data, so every frame from zero has to reach the encoder.
    pub fn requires_full_delivery(&self) -> bool {
        self.timecode_file || self.qp_file || self.seek_mode == SeekMode::Safe
    }
}

/// Source frames `start_frame..total_frame` to deliver.
///
/// Invariant: `start_frame <= total_frame <= source frame count` and
/// `encode_frame_count == total_frame - start_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    /// First source frame written to the pipe.
    pub start_frame: u64,
    /// One past the last source frame written to the pipe.
    pub total_frame: u64,
    /// Number of frames written to the pipe.
    pub encode_frame_count: u64,
}

impl FrameRange {
    /// Iterate the source frame numbers in delivery order.
    pub fn frames(&self) -> std::ops::Range<u64> {
        self.start_frame..self.total_frame
    }

    /// `true` when no frame will be delivered.
    pub fn is_empty(&self) -> bool {
        self.encode_frame_count == 0
    }
}

/// More frames were requested than the source holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    /// End frame implied by the request.
    pub requested: u64,
    /// Frames the source actually has.
    pub available: u64,
}

/// Result of [`plan_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePlan {
    /// Frames to deliver.
    pub range: FrameRange,
    /// How the frames before the seek are skipped.
    pub strategy: SkipStrategy,
    /// Set when the request had to be clamped to the source length.
    pub shortfall: Option<Shortfall>,
}

impl RangePlan {
    /// The `--seek` value to inject into the encoder command, if any.
    pub fn encoder_seek(&self) -> Option<u64> {
        match self.strategy {
            SkipStrategy::EncoderSeek { frames } => Some(frames),
            _ => None,
        }
    }

    /// Number of frames the encoder will actually output.
    ///
    /// Differs from [`FrameRange::encode_frame_count`] on the safe path,
    /// where the leading frames are delivered but dropped by the encoder.
    pub fn output_frame_count(&self) -> u64 {
        self.range.encode_frame_count - self.encoder_seek().unwrap_or(0)
    }
}

/// Plan the frame range for a source with `source_frames` frames.
///
/// Never fails: a request that runs past the end of the source is clamped
/// and reported through [`RangePlan::shortfall`] (and a `warn` log line).
pub fn plan_range(request: &RangeRequest, source_frames: u64) -> RangePlan {
    let requested_end = if request.frames > 0 {
        request.seek.saturating_add(request.frames)
    } else {
        source_frames
    };
    // An explicit count past the end, or a seek past the end with count 0.
    let requested_end = requested_end.max(request.seek);

    let shortfall = (requested_end > source_frames).then(|| {
        log::warn!(
            "{requested_end} frame(s) requested, but {source_frames} frame(s) given"
        );
        Shortfall {
            requested: requested_end,
            available: source_frames,
        }
    });
    let total_frame = requested_end.min(source_frames);
    let seek = request.seek.min(total_frame);

    let (start_frame, strategy) = if seek == 0 {
        (0, SkipStrategy::None)
    } else if request.requires_full_delivery() {
        (0, SkipStrategy::EncoderSeek { frames: seek })
    } else {
        log::info!("Convert \"--seek {seek}\" to internal frame skipping");
        (seek, SkipStrategy::SourceSeek { frames: seek })
    };

    RangePlan {
        range: FrameRange {
            start_frame,
            total_frame,
            encode_frame_count: total_frame - start_frame,
        },
        strategy,
        shortfall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_past_end_gives_empty_range() {
        let plan = plan_range(&RangeRequest::new(1200, 0), 1000);
        assert_eq!(plan.range.start_frame, 1000);
        assert!(plan.range.is_empty());
        assert_eq!(
            plan.shortfall,
            Some(Shortfall {
                requested: 1200,
                available: 1000
            })
        );
    }

    #[test]
    fn huge_frame_count_saturates() {
        let plan = plan_range(&RangeRequest::new(10, u64::MAX), 50);
        assert_eq!(plan.range.total_frame, 50);
        assert!(plan.shortfall.is_some());
    }
}

//! # framepipe
//!
//! Stream raw video frames from a source into the standard input of an
//! external encoder process.
//!
//! `framepipe` decodes nothing and encodes nothing itself. It plans which
//! frames to deliver, launches the encoder with a command line describing
//! the raw input, writes every frame payload into the encoder's stdin pipe
//! (on the calling thread or through a bounded background queue), and
//! forwards the encoder's exit status.
//!
//! ## Quick Start
//!
//! ```no_run
//! use framepipe::{PipeOptions, Pipeline};
//!
//! let options = PipeOptions::new("clip.y4m")
//!     .with_encoder_args(["--crf", "20", "--output", "clip.264"]);
//! let report = Pipeline::new(options).run();
//! std::process::exit(report.exit_code);
//! ```
//!
//! ### Seeking
//!
//! ```no_run
//! use framepipe::{PipeOptions, Pipeline, SeekMode};
//!
//! // Deliver frames 0..500 and let the encoder drop the first 200, keeping
//! // a timecode file aligned with the source.
//! let options = PipeOptions::new("clip.y4m")
//!     .with_seek(200)
//!     .with_frames(300)
//!     .with_seek_mode(SeekMode::Safe)
//!     .with_timecode_file("times.txt");
//! let report = Pipeline::new(options).run();
//! ```
//!
//! ## Features
//!
//! - **Range planning**: seek/frame-count requests clamped to the source,
//!   with source-side ("fast") or encoder-side ("safe") skipping
//! - **Two delivery strategies**: direct blocking writes, or a bounded
//!   queue drained by a background writer thread
//! - **Process supervision**: pipe creation, launch, optional CPU affinity,
//!   ordered teardown and exit status forwarding
//! - **Sources**: YUV4MPEG2 files out of the box; anything FFmpeg decodes
//!   with the `ffmpeg` feature
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | `FfmpegSource` decodes any FFmpeg-readable input to planar YUV 4:2:0 |

pub mod affinity;
pub mod command;
pub mod config;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_source;
pub mod metadata;
pub mod pipe_buffer;
pub mod pipeline;
pub mod planner;
pub mod process;
pub mod progress;
pub mod source;
pub mod writer;
pub mod y4m;

pub use affinity::AffinityMask;
pub use command::EncoderCommand;
pub use config::{DEFAULT_ENCODER, DeliveryMode, PipeOptions, default_buffer_capacity};
pub use error::FramePipeError;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg_source::FfmpegSource;
pub use metadata::{ColorSpace, FieldOrder, VideoInfo};
pub use pipe_buffer::{FrameConsumer, FrameProducer, PendingGauge, PipeBuffer, QueuedFrame};
pub use pipeline::{
    Pipeline, RunReport, RunStage, TeardownStep, drain_and_close, run_pipe_loop,
};
pub use planner::{
    FrameRange, RangePlan, RangeRequest, SeekMode, Shortfall, SkipStrategy, plan_range,
};
pub use process::{EncoderHandle, EncoderProcess, Launch, ProcessSupervisor};
pub use progress::{ProgressCallback, ProgressInfo};
pub use source::{FrameSource, open_source};
pub use writer::{BufferedWriter, DirectWriter, FrameSink, SinkOutcome};
pub use y4m::Y4mSource;

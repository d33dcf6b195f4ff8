//! Run orchestration.
//!
//! A [`Pipeline`] sequences one run:
//!
//! 1. pin this process, if asked to;
//! 2. open the source;
//! 3. plan the frame range and build the encoder command;
//! 4. launch the encoder;
//! 5. stream the planned frames through the configured writer;
//! 6. drain the writer and tear down in a fixed order.
//!
//! Whatever happens after the encoder was launched, teardown is the same
//! routine: close the write end, wait for the encoder, release the process
//! handle, release the source. The steps taken are recorded in
//! [`RunReport::teardown`].
//!
//! # Example
//!
//! ```no_run
//! use framepipe::{DeliveryMode, PipeOptions, Pipeline};
//!
//! let options = PipeOptions::new("clip.y4m")
//!     .with_encoder_args(["--output", "clip.264"])
//!     .with_delivery(DeliveryMode::Buffered { capacity: None });
//!
//! let report = Pipeline::new(options).run();
//! if let Some(error) = &report.error {
//!     eprintln!("error: {error}");
//! }
//! std::process::exit(report.exit_code);
//! ```

use std::{io, path::Path};

use crate::affinity;
use crate::command::EncoderCommand;
use crate::config::PipeOptions;
use crate::error::{EXIT_SUCCESS, FramePipeError};
use crate::metadata::VideoInfo;
use crate::planner::{FrameRange, RangePlan, plan_range};
use crate::process::{EncoderHandle, Launch, ProcessSupervisor};
use crate::progress::ProgressTracker;
use crate::source::{FrameSource, open_source};
use crate::writer::{BufferedWriter, DirectWriter, FrameSink, SinkOutcome};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunStage {
    /// Nothing acquired yet.
    Init,
    /// The source is open and the range planned.
    SourceOpen,
    /// The encoder is running and owns the read end of the pipe.
    ProcessLaunched,
    /// Frames are being delivered.
    Streaming,
    /// No more frames will be produced; the writer is flushing.
    Draining,
    /// Every resource has been released.
    Terminated,
}

/// One step of the ordered teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    /// The parent's write end of the pipe was closed.
    ClosePipeWrite,
    /// The encoder's exit status was collected.
    WaitProcess,
    /// The encoder process handle was released.
    CloseProcess,
    /// The frame source was released.
    CloseSource,
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug)]
pub struct RunReport {
    /// Code to exit this process with.
    pub exit_code: i32,
    /// Furthest stage the run reached.
    pub stage: RunStage,
    /// The range plan, once the source was opened.
    pub plan: Option<RangePlan>,
    /// The encoder invocation, once built.
    pub command: Option<EncoderCommand>,
    /// Frames completely written to the pipe.
    pub frames_delivered: u64,
    /// The encoder's own exit code, when it could be collected.
    pub encoder_exit_code: Option<i32>,
    /// The failure that decided the exit code, if any.
    pub error: Option<FramePipeError>,
    /// Teardown steps in the order they were taken.
    pub teardown: Vec<TeardownStep>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            exit_code: EXIT_SUCCESS,
            stage: RunStage::Init,
            plan: None,
            command: None,
            frames_delivered: 0,
            encoder_exit_code: None,
            error: None,
            teardown: Vec::new(),
        }
    }

    fn fail(mut self, error: FramePipeError) -> Self {
        self.exit_code = error.exit_code();
        self.error = Some(error);
        self
    }

    /// `true` if every frame was delivered and the encoder exited with 0.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.exit_code == EXIT_SUCCESS
    }
}

/// Streams a source into an encoder process.
#[derive(Debug, Clone)]
pub struct Pipeline {
    options: PipeOptions,
}

impl Pipeline {
    /// Create a pipeline for `options`.
    pub fn new(options: PipeOptions) -> Self {
        Self { options }
    }

    /// The options this pipeline runs with.
    pub fn options(&self) -> &PipeOptions {
        &self.options
    }

    /// Plan the range and build the encoder command for a source described
    /// by `info`, without launching anything.
    pub fn plan_for(&self, info: &VideoInfo) -> (RangePlan, EncoderCommand) {
        let plan = plan_range(&self.options.range_request(), info.frame_count);
        let command = EncoderCommand::build(&self.options, info, &plan);
        (plan, command)
    }

    /// Run with the built-in source opener and real child processes.
    pub fn run(&self) -> RunReport {
        self.run_with(open_source, &ProcessSupervisor::new())
    }

    /// Run with a custom source opener and process launcher.
    pub fn run_with<S, O, L>(&self, open: O, launcher: &L) -> RunReport
    where
        S: FrameSource,
        O: FnOnce(&Path) -> Result<S, FramePipeError>,
        L: Launch,
    {
        let options = &self.options;
        let mut report = RunReport::new();

        if let Some(mask) = options.process_affinity {
            match affinity::apply_to_current_process(mask) {
                Ok(()) => log::info!("CPU affinity set to {mask}"),
                Err(error) => log::warn!("{error}"),
            }
        }

        let mut source = match open(&options.input) {
            Ok(source) => source,
            Err(error) => return report.fail(error),
        };
        report.stage = RunStage::SourceOpen;

        let info = source.info().clone();
        log::debug!(
            "Source: {}x{} {} {}-bit, {} fps, {} frame(s)",
            info.width,
            info.height,
            info.color_space,
            info.bit_depth,
            info.frames_per_second(),
            info.frame_count
        );
        let (plan, command) = self.plan_for(&info);
        let range = plan.range;
        report.plan = Some(plan);
        log::info!("{command}");

        let launched = launcher.launch(&command, options.encoder_affinity);
        report.command = Some(command);
        let mut process = match launched {
            Ok(process) => process,
            Err(error) => {
                drop(source);
                report.teardown.push(TeardownStep::CloseSource);
                return report.fail(error);
            }
        };
        report.stage = RunStage::ProcessLaunched;

        let outcome = match process.take_pipe() {
            Some(pipe) => {
                report.stage = RunStage::Streaming;
                self.stream(pipe, &range, &info, &mut source)
            }
            None => SinkOutcome {
                writer: None,
                frames_written: 0,
                error: Some(FramePipeError::PipeCreate(io::Error::other(
                    "encoder pipe is not available",
                ))),
            },
        };
        report.stage = RunStage::Draining;
        report.frames_delivered = outcome.frames_written;

        let exit = drain_and_close(process, outcome.writer, &mut report.teardown);
        drop(source);
        report.teardown.push(TeardownStep::CloseSource);
        report.stage = RunStage::Terminated;

        match (outcome.error, exit) {
            (Some(error), exit) => {
                match &exit {
                    Ok(code) => log::debug!("Encoder exited with code {code} after a failure"),
                    Err(wait_error) => log::warn!("{wait_error}"),
                }
                report.encoder_exit_code = exit.ok();
                report.fail(error)
            }
            (None, Ok(code)) => {
                log::debug!("Delivered {} frame(s)", report.frames_delivered);
                report.encoder_exit_code = Some(code);
                report.exit_code = code;
                report
            }
            (None, Err(error)) => report.fail(error),
        }
    }

    fn stream<W, S>(
        &self,
        pipe: W,
        range: &FrameRange,
        info: &VideoInfo,
        source: &mut S,
    ) -> SinkOutcome<W>
    where
        W: io::Write + Send + 'static,
        S: FrameSource,
    {
        let options = &self.options;
        let mut tracker = options.progress.clone().map(|callback| {
            ProgressTracker::new(callback, Some(range.encode_frame_count), options.batch_size)
        });

        match options.delivery.capacity_for(info.frame_size()) {
            None => stream_into(DirectWriter::new(pipe), range, source, tracker.as_mut()),
            Some(capacity) => match BufferedWriter::spawn(pipe, capacity) {
                Ok(writer) => {
                    let mut writer = writer.with_poll_interval(options.drain_poll_interval);
                    if let Some(tracker) = &tracker {
                        writer = writer.with_drain_observer(tracker.callback().clone());
                    }
                    stream_into(writer, range, source, tracker.as_mut())
                }
                // The pipe went down with the thread closure.
                Err(error) => SinkOutcome {
                    writer: None,
                    frames_written: 0,
                    error: Some(error),
                },
            },
        }
    }
}

fn stream_into<K, S>(
    mut sink: K,
    range: &FrameRange,
    source: &mut S,
    mut tracker: Option<&mut ProgressTracker>,
) -> SinkOutcome<K::Writer>
where
    K: FrameSink,
    S: FrameSource,
{
    let streamed = run_pipe_loop(&mut sink, range, source, |frame| {
        if let Some(tracker) = tracker.as_deref_mut() {
            tracker.advance(frame);
        }
    });
    if let Some(tracker) = tracker {
        tracker.finish();
    }
    let mut outcome = sink.finish();

    if let Err(error) = streamed {
        outcome.error = match (error, outcome.error.take()) {
            // The buffered writer only knows its thread stopped; the thread
            // knows why.
            (FramePipeError::PipeWrite { .. }, Some(cause)) => Some(cause),
            (error, _) => Some(error),
        };
    }
    outcome
}

/// Deliver every frame of `range` from `source` to `sink`, in order.
///
/// `on_frame` is called with each frame number after the sink accepted it.
/// Stops at the first source or write failure; nothing is retried.
///
/// Returns the number of frames handed to the sink.
///
/// # Errors
///
/// The [`FramePipeError::SourceRead`] or [`FramePipeError::PipeWrite`] that
/// stopped the loop.
pub fn run_pipe_loop<K, S, F>(
    sink: &mut K,
    range: &FrameRange,
    source: &mut S,
    mut on_frame: F,
) -> Result<u64, FramePipeError>
where
    K: FrameSink + ?Sized,
    S: FrameSource + ?Sized,
    F: FnMut(u64),
{
    let mut delivered = 0;
    for frame_number in range.frames() {
        let payload = source.frame(frame_number)?;
        sink.write_frame(frame_number, payload)?;
        on_frame(frame_number);
        delivered += 1;
    }
    Ok(delivered)
}

/// Close the write end, then wait for the encoder, then release it.
///
/// `pipe` is the write end handed back by the writer; any write end the
/// process handle still holds is closed too. Each step is appended to
/// `trace`.
///
/// # Errors
///
/// Returns [`FramePipeError::ProcessWait`] if the exit status cannot be
/// collected.
pub fn drain_and_close<P: EncoderHandle>(
    mut process: P,
    pipe: Option<P::Pipe>,
    trace: &mut Vec<TeardownStep>,
) -> Result<i32, FramePipeError> {
    drop(pipe);
    drop(process.take_pipe());
    trace.push(TeardownStep::ClosePipeWrite);

    let exit = process.wait();
    trace.push(TeardownStep::WaitProcess);

    drop(process);
    trace.push(TeardownStep::CloseProcess);
    exit
}

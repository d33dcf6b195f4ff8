//! Error types for the `framepipe` crate.
//!
//! This module defines [`FramePipeError`], the unified error type returned by
//! all fallible operations in the crate, together with the process exit codes
//! each failure kind maps to. Errors carry enough context (paths, frame
//! numbers, the encoder program) to produce a single useful diagnostic line.

use std::{io::Error as IoError, path::PathBuf};

use thiserror::Error;

/// Exit code for a run where every frame was delivered and the encoder
/// reported success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for invalid options detected before any resource was created.
pub const EXIT_INVALID_OPTION: i32 = 1;
/// Exit code when the frame source could not be opened.
pub const EXIT_SOURCE_OPEN_FAILED: i32 = 10;
/// Exit code when the pipe to the encoder could not be created.
pub const EXIT_PIPE_CREATE_FAILED: i32 = 11;
/// Exit code when the encoder process could not be started.
pub const EXIT_PROCESS_LAUNCH_FAILED: i32 = 12;
/// Exit code when writing a frame to the encoder's stdin failed.
pub const EXIT_PIPE_WRITE_FAILED: i32 = 13;
/// Exit code when the source failed to produce a frame mid-stream.
pub const EXIT_SOURCE_READ_FAILED: i32 = 14;
/// Exit code when the encoder's exit status could not be collected.
pub const EXIT_PROCESS_WAIT_FAILED: i32 = 15;

/// The unified error type for all `framepipe` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramePipeError {
    /// The frame source could not be opened.
    #[error("Failed to open frame source at {path}: {reason}")]
    SourceOpen {
        /// Path that was passed to the source opener.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The source failed to produce a frame.
    #[error("Failed to read frame {frame_number} from source: {reason}")]
    SourceRead {
        /// The frame that was requested.
        frame_number: u64,
        /// Underlying reason the read failed.
        reason: String,
    },

    /// The pipe feeding the encoder's standard input could not be created.
    #[error("Failed to create encoder pipe: {0}")]
    PipeCreate(#[source] IoError),

    /// The encoder process could not be spawned.
    #[error("Failed to launch encoder `{program}`: {reason}")]
    ProcessLaunch {
        /// The encoder binary that was executed.
        program: String,
        /// Underlying reason the launch failed.
        reason: String,
    },

    /// A frame could not be written to the encoder's standard input.
    ///
    /// The usual cause is an encoder that has already exited.
    #[error("Failed to write frame {frame_number} to encoder: {reason}")]
    PipeWrite {
        /// The frame whose payload was being written.
        frame_number: u64,
        /// Underlying reason the write failed.
        reason: String,
    },

    /// Waiting on the encoder process failed.
    #[error("Failed to collect encoder exit status: {0}")]
    ProcessWait(#[source] IoError),

    /// A CPU affinity mask could not be parsed or applied.
    #[error("Affinity error: {0}")]
    Affinity(String),

    /// An option value was rejected before the run started.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// An I/O error occurred outside the pipe and process plumbing.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}

impl FramePipeError {
    /// The process exit code this failure is reported with.
    ///
    /// The encoder's own exit code is never produced here; it is forwarded
    /// by the pipeline only when streaming completed normally.
    pub fn exit_code(&self) -> i32 {
        match self {
            FramePipeError::SourceOpen { .. } => EXIT_SOURCE_OPEN_FAILED,
            FramePipeError::SourceRead { .. } => EXIT_SOURCE_READ_FAILED,
            FramePipeError::PipeCreate(_) => EXIT_PIPE_CREATE_FAILED,
            FramePipeError::ProcessLaunch { .. } => EXIT_PROCESS_LAUNCH_FAILED,
            FramePipeError::PipeWrite { .. } => EXIT_PIPE_WRITE_FAILED,
            FramePipeError::ProcessWait(_) => EXIT_PROCESS_WAIT_FAILED,
            FramePipeError::Affinity(_)
            | FramePipeError::InvalidOption(_)
            | FramePipeError::IoError(_) => EXIT_INVALID_OPTION,
        }
    }
}


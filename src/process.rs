//! Encoder process supervision.
//!
//! [`ProcessSupervisor::launch`] creates an anonymous pipe, starts the encoder
//! with the pipe's read end as its standard input, and immediately closes the
//! parent's copy of that read end. The returned [`EncoderProcess`] owns the
//! write end until the pipe writer takes it, and owns the child until its
//! exit status has been collected.
//!
//! The [`Launch`] and [`EncoderHandle`] traits are the seam the
//! [`Pipeline`](crate::Pipeline) drives; tests substitute in-memory doubles.

use std::{
    io::{self, PipeWriter, Write},
    process::{Child, Command, ExitStatus, Stdio},
};

use crate::affinity::{self, AffinityMask};
use crate::command::EncoderCommand;
use crate::error::FramePipeError;

/// Starts encoder processes.
pub trait Launch {
    /// The running encoder.
    type Process: EncoderHandle;

    /// Create the pipe and start the encoder reading from it.
    ///
    /// # Errors
    ///
    /// [`FramePipeError::PipeCreate`] if the pipe cannot be created,
    /// [`FramePipeError::ProcessLaunch`] if the encoder cannot be started.
    /// Either way every pipe end created so far is closed.
    fn launch(
        &self,
        command: &EncoderCommand,
        affinity: Option<AffinityMask>,
    ) -> Result<Self::Process, FramePipeError>;
}

/// A running encoder and the write end of its input pipe.
pub trait EncoderHandle {
    /// Write end of the encoder's stdin pipe.
    type Pipe: Write + Send + 'static;

    /// Take the write end. Returns `None` if it was already taken.
    fn take_pipe(&mut self) -> Option<Self::Pipe>;

    /// Block until the encoder exits and return its exit code.
    ///
    /// A write end still held by the handle is closed first, so the
    /// encoder always sees end-of-input before it is waited on.
    ///
    /// # Errors
    ///
    /// Returns [`FramePipeError::ProcessWait`] if the status cannot be
    /// collected.
    fn wait(&mut self) -> Result<i32, FramePipeError>;
}

/// Launches encoders as OS child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSupervisor;

impl ProcessSupervisor {
    /// Create a supervisor.
    pub fn new() -> Self {
        Self
    }
}

impl Launch for ProcessSupervisor {
    type Process = EncoderProcess;

    fn launch(
        &self,
        command: &EncoderCommand,
        affinity_mask: Option<AffinityMask>,
    ) -> Result<EncoderProcess, FramePipeError> {
        let (read_end, write_end) = io::pipe().map_err(FramePipeError::PipeCreate)?;

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::from(read_end))
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(mask) = affinity_mask {
            affinity::prepare_command(&mut process, mask);
        }

        log::debug!("Spawning encoder: {command}");
        let spawned = process.spawn();
        // `Command` holds the parent's copy of the read end; release it so
        // the child is the only reader and sees EOF once we close our side.
        drop(process);

        let child = match spawned {
            Ok(child) => child,
            Err(error) => {
                drop(write_end);
                let reason = if error.kind() == io::ErrorKind::NotFound {
                    format!("{error} (is `{}` installed and on PATH?)", command.program)
                } else {
                    error.to_string()
                };
                return Err(FramePipeError::ProcessLaunch {
                    program: command.program.clone(),
                    reason,
                });
            }
        };

        if let Some(mask) = affinity_mask {
            match affinity::apply_to_child(&child, mask) {
                Ok(()) => log::info!("Encoder CPU affinity set to {mask}"),
                Err(error) => log::warn!("{error}"),
            }
        }

        log::debug!("Encoder started (pid={})", child.id());
        Ok(EncoderProcess {
            child,
            pipe: Some(write_end),
            exit_code: None,
        })
    }
}

/// An encoder child process started by [`ProcessSupervisor`].
#[derive(Debug)]
pub struct EncoderProcess {
    child: Child,
    pipe: Option<PipeWriter>,
    exit_code: Option<i32>,
}

impl EncoderProcess {
    /// OS process id of the encoder.
    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl EncoderHandle for EncoderProcess {
    type Pipe = PipeWriter;

    fn take_pipe(&mut self) -> Option<PipeWriter> {
        self.pipe.take()
    }

    fn wait(&mut self) -> Result<i32, FramePipeError> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        self.pipe.take();
        let status = self.child.wait().map_err(FramePipeError::ProcessWait)?;
        let code = exit_code_of(status);
        log::debug!("Encoder exited with {status}");
        self.exit_code = Some(code);
        Ok(code)
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        // Never leave a zombie behind, even on early returns and panics.
        if self.exit_code.is_none() {
            self.pipe.take();
            let _ = self.child.wait();
        }
    }
}

/// Exit code of a finished child; signal deaths map to `128 + signal` on
/// Unix, like shells report them.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    crate::error::EXIT_PROCESS_WAIT_FAILED
}

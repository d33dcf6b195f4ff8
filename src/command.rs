//! Encoder command line generation.
//!
//! The encoder reads raw planar frames from its standard input, so it has to
//! be told everything a container would otherwise carry: colorspace, bit
//! depth, resolution, frame rate and the number of frames to expect.
//! [`EncoderCommand::build`] appends those arguments, in x264 syntax, after
//! the user's own arguments.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::config::PipeOptions;
use crate::metadata::{FieldOrder, VideoInfo};
use crate::planner::RangePlan;

/// Flags that make the encoder treat its input as interlaced.
const INTERLACE_FLAGS: [&str; 3] = ["--interlaced", "--tff", "--bff"];

/// Program and arguments of the encoder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    /// Encoder binary, resolved through `PATH` when not a path.
    pub program: String,
    /// Arguments in order.
    pub args: Vec<String>,
}

impl EncoderCommand {
    /// Create a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build the full encoder invocation for streaming `info` as planned.
    ///
    /// # Example
    ///
    /// ```
    /// use framepipe::{EncoderCommand, PipeOptions, RangeRequest, VideoInfo, plan_range};
    ///
    /// let options = PipeOptions::new("clip.y4m").with_encoder_args(["--output", "out.264"]);
    /// let info = VideoInfo::new(640, 480, (25, 1), 100);
    /// let plan = plan_range(&RangeRequest::new(0, 0), info.frame_count);
    ///
    /// let command = EncoderCommand::build(&options, &info, &plan);
    /// assert_eq!(
    ///     command.to_string(),
    ///     "x264 --output out.264 --demuxer raw --input-csp i420 \
    ///      --input-res 640x480 --fps 25/1 --frames 100 -"
    /// );
    /// ```
    pub fn build(options: &PipeOptions, info: &VideoInfo, plan: &RangePlan) -> Self {
        let user_args = options.encoder_args();
        let mut command = Self::new(options.encoder()).args(user_args.iter().cloned());

        command = command
            .args(["--demuxer", "raw"])
            .args(["--input-csp", info.color_space.encoder_name()]);
        if info.bit_depth > 8 {
            command = command.args(["--input-depth".to_string(), info.bit_depth.to_string()]);
        }
        command = command
            .args([
                "--input-res".to_string(),
                format!("{}x{}", info.width, info.height),
            ])
            .args([
                "--fps".to_string(),
                format!("{}/{}", info.fps_numerator, info.fps_denominator),
            ])
            .args(["--frames".to_string(), plan.output_frame_count().to_string()]);

        if let Some(seek) = plan.encoder_seek() {
            command = command.args(["--seek".to_string(), seek.to_string()]);
        }

        let source_sar = info
            .sample_aspect_ratio
            .filter(|_| !has_flag(user_args, "--sar"));
        if let Some((numerator, denominator)) = source_sar {
            command = command.args(["--sar".to_string(), format!("{numerator}:{denominator}")]);
        }

        if let Some(flag) = INTERLACE_FLAGS.iter().find(|flag| has_flag(user_args, flag)) {
            log::info!("{flag} found, keeping the given field order");
        } else {
            match info.field_order {
                FieldOrder::TopFieldFirst => command = command.arg("--tff"),
                FieldOrder::BottomFieldFirst => command = command.arg("--bff"),
                FieldOrder::Progressive => {}
            }
        }

        if let Some(path) = &options.timecode_file {
            command = command.args(["--tcfile-in".to_string(), path.display().to_string()]);
        }
        if let Some(path) = &options.qp_file {
            command = command.args(["--qpfile".to_string(), path.display().to_string()]);
        }

        command.arg("-")
    }

    /// `true` if `flag` appears among the arguments, either alone or as
    /// `flag=value`.
    pub fn has_flag(&self, flag: &str) -> bool {
        has_flag(&self.args, flag)
    }

    /// The value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args.iter().enumerate().find_map(|(index, arg)| {
            if arg == flag {
                self.args.get(index + 1).map(String::as_str)
            } else {
                arg.strip_prefix(flag).and_then(|rest| rest.strip_prefix('='))
            }
        })
    }
}

impl Display for EncoderCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

/// `true` if `flag` appears in `args`, alone or as `flag=value`.
pub(crate) fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| {
        arg == flag
            || arg
                .strip_prefix(flag)
                .is_some_and(|rest| rest.starts_with('='))
    })
}

fn quote(value: &str) -> String {
    if value.is_empty() || value.contains(char::is_whitespace) || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

use std::{io::Write, path::PathBuf, sync::Arc};

use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use colored::Colorize;
use framepipe::{
    AffinityMask, DEFAULT_ENCODER, DeliveryMode, EncoderCommand, PipeOptions, Pipeline,
    ProgressCallback, ProgressInfo, RangePlan, SeekMode, VideoInfo, error::EXIT_SUCCESS,
    open_source,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framepipe clip.y4m -- --crf 18 --output clip.264\n  framepipe clip.y4m --seek 200 --frames 300 --seek-mode safe -- --output part.264\n  framepipe clip.y4m --pipe-mt --pipe-buffer 64 --progress -- --output clip.264\n  framepipe clip.y4m --dry-run --json\n  framepipe --completions zsh > _framepipe";

#[derive(Debug, Parser)]
#[command(
    name = "framepipe",
    version,
    about = "Stream raw video frames into an encoder's standard input",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    /// Input video (.y4m; other formats need the `ffmpeg` feature).
    #[arg(required_unless_present = "completions")]
    input: Option<PathBuf>,

    /// Arguments passed through to the encoder, after `--`.
    #[arg(last = true, value_name = "ENCODER_ARGS")]
    encoder_args: Vec<String>,

    /// Encoder binary to launch.
    #[arg(short = 'L', long, alias = "x264-binary", default_value = DEFAULT_ENCODER)]
    encoder_binary: String,

    /// First frame to encode.
    #[arg(long, default_value_t = 0)]
    seek: u64,

    /// Number of frames to encode (0 = to the end).
    #[arg(long, default_value_t = 0)]
    frames: u64,

    /// How frames before --seek are skipped (fast, safe).
    #[arg(long, default_value = "fast")]
    seek_mode: String,

    /// Timecode file passed to the encoder; forces delivery from frame 0.
    #[arg(long)]
    tcfile_in: Option<PathBuf>,

    /// Quantizer-parameter file passed to the encoder; forces delivery from frame 0.
    #[arg(long)]
    qpfile: Option<PathBuf>,

    /// CPU affinity mask for the encoder (decimal, or 0x-prefixed hex).
    #[arg(long, alias = "x264-affinity", value_name = "MASK")]
    encoder_affinity: Option<String>,

    /// CPU affinity mask for this process (decimal, or 0x-prefixed hex).
    #[arg(long, value_name = "MASK")]
    affinity: Option<String>,

    /// Write to the encoder from a background thread.
    #[arg(long)]
    pipe_mt: bool,

    /// Frames the background writer may queue (default: derived from frame size).
    #[arg(long, value_name = "FRAMES")]
    pipe_buffer: Option<usize>,

    /// Show a progress bar.
    #[arg(long)]
    progress: bool,

    /// Show debug logging output.
    #[arg(long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings and errors.
    #[arg(long)]
    quiet: bool,

    /// Print the plan and the encoder command without launching anything.
    #[arg(long)]
    dry_run: bool,

    /// With --dry-run, print the plan as JSON.
    #[arg(long, requires = "dry_run")]
    json: bool,

    /// Print shell completions and exit.
    #[arg(long, value_name = "SHELL", exclusive = true)]
    completions: Option<Shell>,
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        self.bar
            .set_message(format!("{:.1} fps", info.frames_per_second));
    }

    fn on_drain(&self, pending: usize) {
        self.bar.set_message(format!("buffer: {pending} <--"));
    }
}

/// Shows the pending-frame count while the background writer drains.
struct DrainStatus;

impl ProgressCallback for DrainStatus {
    fn on_progress(&self, _info: &ProgressInfo) {}

    fn on_drain(&self, pending: usize) {
        eprint!("\r{} {pending} <-- ", "buffer:".cyan().bold());
    }

    fn on_drained(&self) {
        // Leave the status line before the encoder prints its summary.
        eprintln!();
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else if quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "framepipe [{}]: {}",
                record.level().as_str().to_ascii_lowercase(),
                record.args()
            )
        })
        .init();
}

fn parse_seek_mode(value: &str) -> Option<SeekMode> {
    match value.to_ascii_lowercase().as_str() {
        "fast" | "0" => Some(SeekMode::Fast),
        "safe" | "1" => Some(SeekMode::Safe),
        _ => None,
    }
}

fn parse_affinity(flag: &str, value: &str) -> Result<AffinityMask, Box<dyn std::error::Error>> {
    value
        .parse::<AffinityMask>()
        .map_err(|error| format!("unsupported {flag}: {error}").into())
}

fn build_options(
    cli: &Cli,
    input: PathBuf,
) -> Result<PipeOptions, Box<dyn std::error::Error>> {
    let seek_mode = parse_seek_mode(&cli.seek_mode)
        .ok_or(format!("unsupported --seek-mode: {}", cli.seek_mode))?;

    let mut options = PipeOptions::new(input)
        .with_encoder(cli.encoder_binary.clone())
        .with_encoder_args(cli.encoder_args.iter().cloned())
        .with_seek(cli.seek)
        .with_frames(cli.frames)
        .with_seek_mode(seek_mode);

    if let Some(path) = &cli.tcfile_in {
        options = options.with_timecode_file(path);
    }
    if let Some(path) = &cli.qpfile {
        options = options.with_qp_file(path);
    }
    if let Some(mask) = &cli.encoder_affinity {
        options = options.with_encoder_affinity(parse_affinity("--encoder-affinity", mask)?);
    }
    if let Some(mask) = &cli.affinity {
        options = options.with_process_affinity(parse_affinity("--affinity", mask)?);
    }

    if cli.pipe_buffer == Some(0) {
        return Err("--pipe-buffer must be greater than 0".into());
    }
    if cli.pipe_mt {
        options = options.with_delivery(DeliveryMode::Buffered {
            capacity: cli.pipe_buffer,
        });
    } else if cli.pipe_buffer.is_some() {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            "--pipe-buffer has no effect without --pipe-mt".yellow()
        );
    }

    Ok(options)
}

fn print_plan(
    options: &PipeOptions,
    info: &VideoInfo,
    plan: &RangePlan,
    command: &EncoderCommand,
    as_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let capacity = options.delivery().capacity_for(info.frame_size());
    if as_json {
        let payload = json!({
            "input": options.input().display().to_string(),
            "source": {
                "width": info.width,
                "height": info.height,
                "fps": format!("{}/{}", info.fps_numerator, info.fps_denominator),
                "color_space": info.color_space.encoder_name(),
                "bit_depth": info.bit_depth,
                "frame_size": info.frame_size(),
                "frame_count": info.frame_count,
            },
            "plan": {
                "start_frame": plan.range.start_frame,
                "total_frame": plan.range.total_frame,
                "encode_frame_count": plan.range.encode_frame_count,
                "encoder_seek": plan.encoder_seek(),
                "output_frame_count": plan.output_frame_count(),
                "shortfall": plan.shortfall.map(|shortfall| json!({
                    "requested": shortfall.requested,
                    "available": shortfall.available,
                })),
            },
            "delivery": match capacity {
                Some(capacity) => json!({ "mode": "buffered", "capacity": capacity }),
                None => json!({ "mode": "direct" }),
            },
            "command": {
                "program": command.program,
                "args": command.args,
            },
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "Source: {}x{} {} {}-bit @ {}/{} fps, {} frame(s)",
            info.width,
            info.height,
            info.color_space,
            info.bit_depth,
            info.fps_numerator,
            info.fps_denominator,
            info.frame_count,
        );
        println!(
            "Frames: {}..{} ({} delivered, {} encoded)",
            plan.range.start_frame,
            plan.range.total_frame,
            plan.range.encode_frame_count,
            plan.output_frame_count(),
        );
        match capacity {
            Some(capacity) => println!("Delivery: buffered ({capacity} frame(s))"),
            None => println!("Delivery: direct"),
        }
        println!("Command: {command}");
    }
    Ok(())
}

fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "framepipe", &mut std::io::stdout());
        return Ok(EXIT_SUCCESS);
    }

    init_logging(cli.verbose, cli.quiet);

    let input = cli.input.clone().ok_or("missing <INPUT>")?;
    let mut options = build_options(&cli, input)?;

    if cli.dry_run {
        let source = match open_source(options.input()) {
            Ok(source) => source,
            Err(error) => {
                eprintln!("error: {error}");
                return Ok(error.exit_code());
            }
        };
        let pipeline = Pipeline::new(options);
        let (plan, command) = pipeline.plan_for(source.info());
        print_plan(pipeline.options(), source.info(), &plan, &command, cli.json)?;
        return Ok(EXIT_SUCCESS);
    }

    let terminal_progress = if cli.progress {
        let progress = Arc::new(TerminalProgress::new()?);
        options = options.with_progress(progress.clone());
        Some(progress)
    } else {
        if cli.pipe_mt && !cli.quiet {
            options = options.with_progress(Arc::new(DrainStatus));
        }
        None
    };

    let report = Pipeline::new(options).run();

    if let Some(progress) = terminal_progress {
        progress.bar.finish_and_clear();
    }
    if let Some(error) = &report.error {
        eprintln!("error: {error}");
    } else if report.exit_code != EXIT_SUCCESS {
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("encoder exited with code {}", report.exit_code).yellow()
        );
    }
    log::debug!(
        "{} frame(s) delivered, teardown: {:?}",
        report.frames_delivered,
        report.teardown
    );

    Ok(report.exit_code)
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(framepipe::error::EXIT_INVALID_OPTION);
        }
    }
}

//! Encoder command generation tests.

use framepipe::{
    ColorSpace, EncoderCommand, FieldOrder, PipeOptions, RangeRequest, SeekMode, VideoInfo,
    plan_range,
};

fn build(options: &PipeOptions, info: &VideoInfo) -> EncoderCommand {
    let plan = plan_range(&options.range_request(), info.frame_count);
    EncoderCommand::build(options, info, &plan)
}

fn hd_info() -> VideoInfo {
    VideoInfo::new(1920, 1080, (24000, 1001), 1000)
}

// ── Raw input description ──────────────────────────────────────────

#[test]
fn user_args_come_first_and_stdin_last() {
    let options = PipeOptions::new("clip.y4m").with_encoder_args(["--preset", "slow", "-o", "out.mkv"]);
    let command = build(&options, &hd_info());

    assert_eq!(command.program, "x264");
    assert_eq!(&command.args[..4], ["--preset", "slow", "-o", "out.mkv"]);
    assert_eq!(command.args.last().map(String::as_str), Some("-"));
    assert_eq!(command.flag_value("--demuxer"), Some("raw"));
    assert_eq!(command.flag_value("--input-csp"), Some("i420"));
    assert_eq!(command.flag_value("--input-res"), Some("1920x1080"));
    assert_eq!(command.flag_value("--fps"), Some("24000/1001"));
    assert_eq!(command.flag_value("--frames"), Some("1000"));
    assert!(!command.has_flag("--input-depth"));
}

#[test]
fn high_bit_depth_sets_input_depth() {
    let mut info = hd_info();
    info.color_space = ColorSpace::I444;
    info.bit_depth = 10;
    let command = build(&PipeOptions::new("clip.y4m"), &info);

    assert_eq!(command.flag_value("--input-csp"), Some("i444"));
    assert_eq!(command.flag_value("--input-depth"), Some("10"));
}

#[test]
fn custom_encoder_binary() {
    let command = build(&PipeOptions::new("clip.y4m").with_encoder("/opt/x264/x264-10bit"), &hd_info());
    assert_eq!(command.program, "/opt/x264/x264-10bit");
}

// ── Seeking ────────────────────────────────────────────────────────

#[test]
fn safe_seek_injects_seek_and_output_count() {
    let options = PipeOptions::new("clip.y4m")
        .with_seek(200)
        .with_frames(300)
        .with_seek_mode(SeekMode::Safe);
    let command = build(&options, &hd_info());

    assert_eq!(command.flag_value("--seek"), Some("200"));
    assert_eq!(command.flag_value("--frames"), Some("300"));
}

#[test]
fn fast_seek_injects_nothing() {
    let options = PipeOptions::new("clip.y4m").with_seek(200).with_frames(300);
    let command = build(&options, &hd_info());

    assert!(!command.has_flag("--seek"));
    assert_eq!(command.flag_value("--frames"), Some("300"));
}

#[test]
fn metadata_files_are_passed_through() {
    let options = PipeOptions::new("clip.y4m")
        .with_seek(10)
        .with_timecode_file("times.txt")
        .with_qp_file("frames.qp");
    let command = build(&options, &hd_info());

    assert_eq!(command.flag_value("--tcfile-in"), Some("times.txt"));
    assert_eq!(command.flag_value("--qpfile"), Some("frames.qp"));
    assert_eq!(command.flag_value("--seek"), Some("10"));
}

// ── Aspect ratio and field order ───────────────────────────────────

#[test]
fn source_sar_is_added_unless_given() {
    let mut info = hd_info();
    info.sample_aspect_ratio = Some((4, 3));

    let command = build(&PipeOptions::new("clip.y4m"), &info);
    assert_eq!(command.flag_value("--sar"), Some("4:3"));

    let options = PipeOptions::new("clip.y4m").with_encoder_args(["--sar", "1:1"]);
    let command = build(&options, &info);
    assert_eq!(command.args.iter().filter(|arg| *arg == "--sar").count(), 1);
    assert_eq!(command.flag_value("--sar"), Some("1:1"));
}

#[test]
fn interlaced_source_adds_field_order() {
    let mut info = hd_info();
    info.field_order = FieldOrder::BottomFieldFirst;
    let command = build(&PipeOptions::new("clip.y4m"), &info);
    assert!(command.has_flag("--bff"));

    info.field_order = FieldOrder::TopFieldFirst;
    let command = build(&PipeOptions::new("clip.y4m"), &info);
    assert!(command.has_flag("--tff"));
}

#[test]
fn user_field_order_wins() {
    let mut info = hd_info();
    info.field_order = FieldOrder::BottomFieldFirst;
    let options = PipeOptions::new("clip.y4m").with_encoder_args(["--interlaced"]);
    let command = build(&options, &info);

    assert!(!command.has_flag("--bff"));
    assert!(!command.has_flag("--tff"));
}

#[test]
fn progressive_source_adds_no_field_order() {
    let command = build(&PipeOptions::new("clip.y4m"), &hd_info());
    assert!(!command.has_flag("--tff"));
    assert!(!command.has_flag("--bff"));
}

// ── Display ────────────────────────────────────────────────────────

#[test]
fn display_matches_a_shell_line() {
    let info = VideoInfo::new(640, 480, (25, 1), 50);
    let plan = plan_range(&RangeRequest::new(0, 0), info.frame_count);
    let options = PipeOptions::new("clip.y4m").with_encoder_args(["--output", "my clip.264"]);

    assert_eq!(
        EncoderCommand::build(&options, &info, &plan).to_string(),
        "x264 --output \"my clip.264\" --demuxer raw --input-csp i420 --input-res 640x480 --fps 25/1 --frames 50 -"
    );
}

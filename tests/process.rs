//! Process supervisor tests against real child processes.
//!
//! `sh -c SCRIPT` stands in for the encoder: generated encoder arguments
//! land in the script's positional parameters and are otherwise ignored.

#![cfg(unix)]

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use framepipe::{
    DeliveryMode, DirectWriter, EncoderCommand, EncoderHandle, FramePipeError, FrameSink, Launch,
    PipeOptions, Pipeline, ProcessSupervisor, TeardownStep, drain_and_close,
    error::{EXIT_PIPE_WRITE_FAILED, EXIT_PROCESS_LAUNCH_FAILED},
};

fn shell(script: &str) -> EncoderCommand {
    EncoderCommand::new("sh").args(["-c", script])
}

fn quoted(path: &Path) -> String {
    format!("'{}'", path.display())
}

/// Write a 4x2 4:2:0 y4m file whose frame `n` is filled with byte `n`.
fn write_y4m(path: &Path, frames: u8) {
    let mut data = b"YUV4MPEG2 W4 H2 F25:1 Ip A1:1 C420jpeg\n".to_vec();
    for frame in 0..frames {
        data.extend_from_slice(b"FRAME\n");
        data.extend(std::iter::repeat_n(frame, 12));
    }
    fs::write(path, data).unwrap();
}

// ── Launch and wait ────────────────────────────────────────────────

#[test]
fn exit_code_is_collected() {
    let mut process = ProcessSupervisor::new()
        .launch(&shell("exit 7"), None)
        .expect("sh should launch");
    assert_eq!(process.wait().unwrap(), 7);
    // A second wait returns the cached code.
    assert_eq!(process.wait().unwrap(), 7);
}

#[test]
fn signal_death_maps_to_128_plus_signal() {
    let mut process = ProcessSupervisor::new()
        .launch(&shell("kill -9 $$"), None)
        .unwrap();
    assert_eq!(process.wait().unwrap(), 137);
}

#[test]
fn missing_binary_is_a_launch_failure() {
    let command = EncoderCommand::new("framepipe-test-no-such-encoder").arg("-");
    match ProcessSupervisor::new().launch(&command, None) {
        Err(error @ FramePipeError::ProcessLaunch { .. }) => {
            assert_eq!(error.exit_code(), EXIT_PROCESS_LAUNCH_FAILED);
            assert!(error.to_string().contains("framepipe-test-no-such-encoder"));
        }
        other => panic!("Expected ProcessLaunch, got: {:?}", other.map(|_| ())),
    }
}

// ── Pipe wiring ────────────────────────────────────────────────────

#[test]
fn child_reads_everything_and_sees_eof() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("received.bin");

    let mut process = ProcessSupervisor::new()
        .launch(&shell(&format!("cat > {}", quoted(&output))), None)
        .unwrap();
    let pipe = process.take_pipe().expect("fresh process holds its pipe");
    assert!(process.take_pipe().is_none());

    let mut writer = DirectWriter::new(pipe);
    for frame in 0..64_u8 {
        writer.write_frame(u64::from(frame), vec![frame; 4096]).unwrap();
    }
    let outcome = writer.finish();
    assert!(outcome.error.is_none());

    // `cat` only exits once it sees EOF, so this returning proves the read
    // end is held by the child alone.
    let mut trace = Vec::new();
    let code = drain_and_close(process, outcome.writer, &mut trace).unwrap();
    assert_eq!(code, 0);
    assert_eq!(
        trace,
        [
            TeardownStep::ClosePipeWrite,
            TeardownStep::WaitProcess,
            TeardownStep::CloseProcess,
        ]
    );

    let received = fs::read(&output).unwrap();
    assert_eq!(received.len(), 64 * 4096);
    assert!(received.chunks(4096).enumerate().all(|(index, chunk)| {
        chunk.iter().all(|&byte| usize::from(byte) == index)
    }));
}

#[test]
fn wait_closes_an_untaken_pipe_first() {
    let mut process = ProcessSupervisor::new().launch(&shell("cat > /dev/null"), None).unwrap();
    // Would hang if the write end were still open.
    assert_eq!(process.wait().unwrap(), 0);
}

#[test]
fn writing_to_an_exited_encoder_fails() {
    let mut process = ProcessSupervisor::new().launch(&shell("exit 0"), None).unwrap();
    let mut pipe = process.take_pipe().unwrap();

    let chunk = vec![0_u8; 1 << 20];
    let failed = (0..64).any(|_| pipe.write_all(&chunk).is_err());
    assert!(failed, "writes must fail once the reader is gone");

    drop(pipe);
    assert_eq!(process.wait().unwrap(), 0);
}

// ── End to end ─────────────────────────────────────────────────────

fn end_to_end(delivery: DeliveryMode) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("clip.y4m");
    let output = dir.path().join("out.yuv");
    let args_file = dir.path().join("args.txt");
    write_y4m(&input, 30);

    let script = format!(
        "printf '%s\\n' \"$0\" \"$@\" > {}; cat > {}",
        quoted(&args_file),
        quoted(&output)
    );
    let options = PipeOptions::new(&input)
        .with_encoder("sh")
        .with_encoder_args(["-c", script.as_str()])
        .with_seek(5)
        .with_frames(10)
        .with_delivery(delivery);
    let report = Pipeline::new(options).run();

    assert!(report.is_success(), "unexpected error: {:?}", report.error);
    assert_eq!(report.frames_delivered, 10);

    let received = fs::read(&output).unwrap();
    let expected: Vec<u8> = (5..15_u8).flat_map(|frame| [frame; 12]).collect();
    assert_eq!(received, expected);

    let args = fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(
        args,
        [
            "--demuxer",
            "raw",
            "--input-csp",
            "i420",
            "--input-res",
            "4x2",
            "--fps",
            "25/1",
            "--frames",
            "10",
            "--sar",
            "1:1",
            "-",
        ]
    );
}

#[test]
fn end_to_end_direct() {
    end_to_end(DeliveryMode::Direct);
}

#[test]
fn end_to_end_buffered() {
    end_to_end(DeliveryMode::Buffered { capacity: Some(2) });
}

#[test]
fn early_encoder_exit_is_a_pipe_write_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input: PathBuf = dir.path().join("clip.y4m");
    let mut data = b"YUV4MPEG2 W1024 H1024 F25:1 C444\n".to_vec();
    for _ in 0..20 {
        data.extend_from_slice(b"FRAME\n");
        data.extend(std::iter::repeat_n(0_u8, 1024 * 1024 * 3));
    }
    fs::write(&input, data).unwrap();

    let options = PipeOptions::new(&input)
        .with_encoder("sh")
        .with_encoder_args(["-c", "head -c 1000 > /dev/null; exit 4"]);
    let report = Pipeline::new(options).run();

    assert_eq!(report.exit_code, EXIT_PIPE_WRITE_FAILED);
    assert_eq!(report.encoder_exit_code, Some(4));
    assert!(report.frames_delivered < 20);
    assert_eq!(report.teardown.len(), 4);
}

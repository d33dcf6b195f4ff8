//! Frame range planning tests.

use framepipe::{FrameRange, RangeRequest, SeekMode, Shortfall, SkipStrategy, plan_range};

// ── Full-length and counted ranges ─────────────────────────────────

#[test]
fn zero_seek_zero_frames_is_full_length() {
    let plan = plan_range(&RangeRequest::new(0, 0), 1000);
    assert_eq!(
        plan.range,
        FrameRange {
            start_frame: 0,
            total_frame: 1000,
            encode_frame_count: 1000,
        }
    );
    assert_eq!(plan.strategy, SkipStrategy::None);
    assert_eq!(plan.shortfall, None);
    assert_eq!(plan.encoder_seek(), None);
}

#[test]
fn frame_count_from_zero() {
    let plan = plan_range(&RangeRequest::new(0, 250), 1000);
    assert_eq!(plan.range.total_frame, 250);
    assert_eq!(plan.range.encode_frame_count, 250);
    assert_eq!(plan.output_frame_count(), 250);
}

#[test]
fn zero_frames_with_seek_runs_to_end_without_warning() {
    let plan = plan_range(&RangeRequest::new(100, 0), 1000);
    assert_eq!(plan.range.start_frame, 100);
    assert_eq!(plan.range.total_frame, 1000);
    assert_eq!(plan.range.encode_frame_count, 900);
    assert_eq!(plan.shortfall, None);
}

#[test]
fn empty_source_gives_empty_range() {
    let plan = plan_range(&RangeRequest::new(0, 0), 0);
    assert!(plan.range.is_empty());
    assert_eq!(plan.range.frames().count(), 0);
}

// ── Fast path ──────────────────────────────────────────────────────

#[test]
fn fast_seek_skips_in_the_source() {
    let plan = plan_range(&RangeRequest::new(200, 300), 1000);
    assert_eq!(plan.range.start_frame, 200);
    assert_eq!(plan.range.total_frame, 500);
    assert_eq!(plan.range.encode_frame_count, 300);
    assert_eq!(plan.strategy, SkipStrategy::SourceSeek { frames: 200 });
    assert_eq!(plan.encoder_seek(), None);
    assert_eq!(plan.range.frames(), 200..500);
}

// ── Safe path ──────────────────────────────────────────────────────

#[test]
fn safe_mode_delivers_from_zero_and_injects_seek() {
    let request = RangeRequest::new(200, 300).with_seek_mode(SeekMode::Safe);
    let plan = plan_range(&request, 1000);
    assert_eq!(plan.range.start_frame, 0);
    assert_eq!(plan.range.total_frame, 500);
    assert_eq!(plan.range.encode_frame_count, 500);
    assert_eq!(plan.encoder_seek(), Some(200));
    assert_eq!(plan.output_frame_count(), 300);
}

#[test]
fn timecode_file_forces_safe_path() {
    let request = RangeRequest::new(50, 10).with_timecode_file(true);
    assert!(request.requires_full_delivery());
    let plan = plan_range(&request, 100);
    assert_eq!(plan.range.start_frame, 0);
    assert_eq!(plan.strategy, SkipStrategy::EncoderSeek { frames: 50 });
}

#[test]
fn qp_file_forces_safe_path() {
    let request = RangeRequest::new(50, 10).with_qp_file(true);
    let plan = plan_range(&request, 100);
    assert_eq!(plan.range.start_frame, 0);
    assert_eq!(plan.range.encode_frame_count, 60);
}

#[test]
fn zero_seek_is_identical_on_both_paths() {
    let fast = plan_range(&RangeRequest::new(0, 40), 100);
    let safe = plan_range(
        &RangeRequest::new(0, 40).with_seek_mode(SeekMode::Safe),
        100,
    );
    assert_eq!(fast, safe);
    assert_eq!(safe.encoder_seek(), None);
}

// ── Clamping ───────────────────────────────────────────────────────

#[test]
fn overlong_request_is_clamped_with_shortfall() {
    let plan = plan_range(&RangeRequest::new(900, 500), 1000);
    assert_eq!(plan.range.total_frame, 1000);
    assert_eq!(plan.range.encode_frame_count, 100);
    assert_eq!(
        plan.shortfall,
        Some(Shortfall {
            requested: 1400,
            available: 1000,
        })
    );
}

#[test]
fn clamped_safe_request_keeps_encoder_seek() {
    let request = RangeRequest::new(900, 500).with_seek_mode(SeekMode::Safe);
    let plan = plan_range(&request, 1000);
    assert_eq!(plan.range.start_frame, 0);
    assert_eq!(plan.range.encode_frame_count, 1000);
    assert_eq!(plan.output_frame_count(), 100);
    assert!(plan.shortfall.is_some());
}

#[test]
fn invariants_hold_across_requests() {
    for source_frames in [0_u64, 1, 7, 100] {
        for seek in [0_u64, 1, 6, 50, 200] {
            for frames in [0_u64, 1, 3, 99, 1000] {
                for mode in [SeekMode::Fast, SeekMode::Safe] {
                    let request = RangeRequest::new(seek, frames).with_seek_mode(mode);
                    let plan = plan_range(&request, source_frames);
                    let range = plan.range;

                    assert!(range.start_frame <= range.total_frame);
                    assert!(range.total_frame <= source_frames);
                    assert_eq!(
                        range.encode_frame_count,
                        range.total_frame - range.start_frame
                    );
                    let end = if frames > 0 { seek + frames } else { source_frames };
                    assert_eq!(range.total_frame, end.max(seek).min(source_frames));
                    assert!(plan.output_frame_count() <= range.encode_frame_count);
                }
            }
        }
    }
}

//! Bounded frame queue and pipe writer tests.

use std::{
    io::{self, Write},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use framepipe::{
    BufferedWriter, DirectWriter, FramePipeError, FrameSink, PipeBuffer, ProgressCallback,
    ProgressInfo, QueuedFrame,
};

/// Deterministic jitter for timing tests.
struct XorShift(u64);

impl XorShift {
    fn next_micros(&mut self, max: u64) -> Duration {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        Duration::from_micros(self.0 % max)
    }
}

fn payload(frame_number: u64) -> Vec<u8> {
    frame_number.to_le_bytes().to_vec()
}

fn decode_frames(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Records writes; optionally sleeps per write and fails after a number of
/// payloads.
#[derive(Clone, Default)]
struct RecordingPipe {
    written: Arc<Mutex<Vec<u8>>>,
    writes: Arc<AtomicUsize>,
    delay: Duration,
    fail_after: Option<usize>,
}

impl Write for RecordingPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self
            .fail_after
            .is_some_and(|limit| self.writes.load(Ordering::SeqCst) >= limit)
        {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.written.lock().unwrap().extend_from_slice(buf);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── PipeBuffer ─────────────────────────────────────────────────────

#[test]
fn fifo_order_under_random_timing() {
    let (producer, consumer) = PipeBuffer::bounded(4);

    let reader = thread::spawn(move || {
        let mut jitter = XorShift(0x9e37_79b9_7f4a_7c15);
        let mut seen = Vec::new();
        while let Some(frame) = consumer.recv() {
            thread::sleep(jitter.next_micros(300));
            seen.push(frame.frame_number);
            consumer.mark_written();
        }
        seen
    });

    let mut jitter = XorShift(0x2545_f491_4f6c_dd1d);
    for frame_number in 0..300 {
        thread::sleep(jitter.next_micros(300));
        producer
            .push(QueuedFrame {
                frame_number,
                payload: payload(frame_number),
            })
            .expect("consumer is alive");
    }
    let gauge = producer.gauge();
    producer.close();

    let seen = reader.join().unwrap();
    assert_eq!(seen, (0..300).collect::<Vec<_>>());
    assert_eq!(gauge.get(), 0);
}

#[test]
fn closing_drains_every_queued_frame() {
    let (producer, consumer) = PipeBuffer::bounded(8);
    for frame_number in 0..8 {
        producer
            .push(QueuedFrame {
                frame_number,
                payload: Vec::new(),
            })
            .unwrap();
    }
    assert_eq!(producer.queued(), 8);
    producer.close();

    let mut received = 0;
    while consumer.recv().is_some() {
        consumer.mark_written();
        received += 1;
    }
    assert_eq!(received, 8);
    assert!(consumer.recv().is_none(), "closed and drained stays closed");
}

#[test]
fn push_fails_once_consumer_is_gone() {
    let (producer, consumer) = PipeBuffer::bounded(2);
    drop(consumer);

    let frame = QueuedFrame {
        frame_number: 7,
        payload: vec![1, 2, 3],
    };
    let returned = producer.push(frame.clone()).unwrap_err();
    assert_eq!(returned, frame);
    assert_eq!(producer.gauge().get(), 0, "failed push must not leave a pending frame");
}

#[test]
fn zero_capacity_is_raised_to_one() {
    let (producer, _consumer) = PipeBuffer::bounded(0);
    assert_eq!(producer.capacity(), 1);
}

#[test]
fn gauge_never_goes_negative() {
    let (producer, consumer) = PipeBuffer::bounded(1);
    consumer.mark_written();
    consumer.mark_written();
    assert_eq!(producer.gauge().get(), 0);
}

// ── DirectWriter ───────────────────────────────────────────────────

#[test]
fn direct_writer_writes_in_call_order() {
    let pipe = RecordingPipe::default();
    let mut writer = DirectWriter::new(pipe.clone());
    for frame_number in [3, 4, 5] {
        writer.write_frame(frame_number, payload(frame_number)).unwrap();
    }
    let outcome = writer.finish();
    assert_eq!(outcome.frames_written, 3);
    assert!(outcome.error.is_none());
    assert!(outcome.writer.is_some());
    assert_eq!(decode_frames(&pipe.written.lock().unwrap()), vec![3, 4, 5]);
}

#[test]
fn direct_writer_reports_failing_frame() {
    let pipe = RecordingPipe {
        fail_after: Some(2),
        ..RecordingPipe::default()
    };
    let mut writer = DirectWriter::new(pipe);
    writer.write_frame(0, payload(0)).unwrap();
    writer.write_frame(1, payload(1)).unwrap();
    match writer.write_frame(2, payload(2)) {
        Err(FramePipeError::PipeWrite { frame_number, .. }) => assert_eq!(frame_number, 2),
        other => panic!("Expected PipeWrite, got: {other:?}"),
    }
    assert_eq!(writer.finish().frames_written, 2);
}

// ── BufferedWriter ─────────────────────────────────────────────────

#[test]
fn buffered_writer_bounds_queue_with_slow_consumer() {
    let pipe = RecordingPipe {
        delay: Duration::from_micros(200),
        ..RecordingPipe::default()
    };
    let mut writer = BufferedWriter::spawn(pipe.clone(), 16)
        .unwrap()
        .with_poll_interval(Duration::from_millis(5));

    for frame_number in 0..1000 {
        writer.write_frame(frame_number, payload(frame_number)).unwrap();
        assert!(writer.queued() <= 16, "queue exceeded capacity");
        assert!(writer.pending() <= 17, "more frames in flight than capacity allows");
    }

    let outcome = writer.finish();
    assert!(outcome.error.is_none());
    assert_eq!(outcome.frames_written, 1000);
    assert_eq!(
        decode_frames(&pipe.written.lock().unwrap()),
        (0..1000).collect::<Vec<_>>()
    );
}

#[test]
fn buffered_writer_finish_waits_for_every_frame() {
    let pipe = RecordingPipe {
        delay: Duration::from_millis(2),
        ..RecordingPipe::default()
    };
    let mut writer = BufferedWriter::spawn(pipe.clone(), 64)
        .unwrap()
        .with_poll_interval(Duration::from_millis(1));
    for frame_number in 0..40 {
        writer.write_frame(frame_number, payload(frame_number)).unwrap();
    }
    let outcome = writer.finish();
    assert_eq!(outcome.frames_written, 40);
    assert_eq!(pipe.writes.load(Ordering::SeqCst), 40);
}

#[test]
fn buffered_writer_stops_producer_after_write_failure() {
    let pipe = RecordingPipe {
        fail_after: Some(5),
        ..RecordingPipe::default()
    };
    let mut writer = BufferedWriter::spawn(pipe, 2)
        .unwrap()
        .with_poll_interval(Duration::from_millis(1));

    let mut accepted = 0;
    for frame_number in 0..1000 {
        if writer.write_frame(frame_number, payload(frame_number)).is_err() {
            break;
        }
        accepted += 1;
    }
    assert!(accepted < 1000, "producer must be stopped by the failure");

    let outcome = writer.finish();
    assert_eq!(outcome.frames_written, 5);
    match outcome.error {
        Some(FramePipeError::PipeWrite { frame_number, .. }) => assert_eq!(frame_number, 5),
        other => panic!("Expected PipeWrite, got: {other:?}"),
    }
}

struct DrainRecorder {
    pending: Mutex<Vec<usize>>,
    drained: AtomicUsize,
}

impl ProgressCallback for DrainRecorder {
    fn on_progress(&self, _info: &ProgressInfo) {}

    fn on_drain(&self, pending: usize) {
        self.pending.lock().unwrap().push(pending);
    }

    fn on_drained(&self) {
        self.drained.fetch_add(1, Ordering::SeqCst);
        // Nothing may be reported after the drain ended.
        self.pending.lock().unwrap().push(usize::MAX);
    }
}

#[test]
fn drain_observer_sees_pending_count_fall() {
    let recorder = Arc::new(DrainRecorder {
        pending: Mutex::new(Vec::new()),
        drained: AtomicUsize::new(0),
    });
    let pipe = RecordingPipe {
        delay: Duration::from_millis(3),
        ..RecordingPipe::default()
    };
    let mut writer = BufferedWriter::spawn(pipe, 32)
        .unwrap()
        .with_poll_interval(Duration::from_millis(1))
        .with_drain_observer(recorder.clone());
    for frame_number in 0..20 {
        writer.write_frame(frame_number, payload(frame_number)).unwrap();
    }
    assert!(writer.finish().error.is_none());

    assert_eq!(recorder.drained.load(Ordering::SeqCst), 1);
    let mut pending = recorder.pending.lock().unwrap().clone();
    assert_eq!(pending.pop(), Some(usize::MAX), "drain end must come last");
    assert!(!pending.is_empty(), "drain should have been observed");
    assert!(pending.iter().all(|&value| value <= 20));
    assert!(pending.windows(2).all(|pair| pair[0] >= pair[1]));
}

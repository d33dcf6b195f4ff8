//! Pipe writer strategies.
//!
//! A [`FrameSink`] accepts frame payloads in delivery order and eventually
//! hands the underlying writer back through [`FrameSink::finish`], so that
//! closing the pipe stays with whoever owns the encoder process.
//!
//! - [`DirectWriter`] writes on the caller's thread.
//! - [`BufferedWriter`] queues frames for a single background thread that
//!   performs the blocking writes, decoupling source cadence from encoder
//!   cadence by up to `capacity` frames.
//!
//! Neither strategy retries a failed write: the only realistic cause is an
//! encoder that stopped reading.

use std::{
    io::Write,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::error::FramePipeError;
use crate::pipe_buffer::{FrameConsumer, FrameProducer, PendingGauge, PipeBuffer, QueuedFrame};
use crate::progress::ProgressCallback;

/// Default interval at which [`BufferedWriter::finish`] checks on the
/// background thread.
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// What a [`FrameSink`] leaves behind when it finishes.
#[derive(Debug)]
pub struct SinkOutcome<W> {
    /// The writer, returned for closing. `None` if it was lost with a
    /// panicking writer thread (it has been dropped, and so closed, already).
    pub writer: Option<W>,
    /// Frames whose payload was completely written.
    pub frames_written: u64,
    /// The first write failure, if any.
    pub error: Option<FramePipeError>,
}

/// Destination for frame payloads.
pub trait FrameSink {
    /// The wrapped writer handed back by [`finish`](FrameSink::finish).
    type Writer;

    /// Deliver one frame.
    ///
    /// # Errors
    ///
    /// Returns [`FramePipeError::PipeWrite`] when the frame cannot be
    /// delivered; callers must stop producing.
    fn write_frame(&mut self, frame_number: u64, payload: Vec<u8>) -> Result<(), FramePipeError>;

    /// Flush everything accepted so far and give the writer back.
    fn finish(self) -> SinkOutcome<Self::Writer>;
}

fn write_error(frame_number: u64, error: &std::io::Error) -> FramePipeError {
    FramePipeError::PipeWrite {
        frame_number,
        reason: error.to_string(),
    }
}

/// Writes each frame on the calling thread.
#[derive(Debug)]
pub struct DirectWriter<W: Write> {
    writer: W,
    frames_written: u64,
    last_frame: Option<u64>,
}

impl<W: Write> DirectWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_written: 0,
            last_frame: None,
        }
    }
}

impl<W: Write> FrameSink for DirectWriter<W> {
    type Writer = W;

    fn write_frame(&mut self, frame_number: u64, payload: Vec<u8>) -> Result<(), FramePipeError> {
        self.writer
            .write_all(&payload)
            .map_err(|error| write_error(frame_number, &error))?;
        self.frames_written += 1;
        self.last_frame = Some(frame_number);
        Ok(())
    }

    fn finish(mut self) -> SinkOutcome<W> {
        let error = self
            .writer
            .flush()
            .err()
            .map(|error| write_error(self.last_frame.unwrap_or(0), &error));
        SinkOutcome {
            writer: Some(self.writer),
            frames_written: self.frames_written,
            error,
        }
    }
}

/// Result of the background thread.
struct WorkerOutcome<W> {
    writer: W,
    frames_written: u64,
    error: Option<FramePipeError>,
}

/// Hands frames to a background thread that writes them in FIFO order.
///
/// The background thread is the only writer once this strategy is in use.
pub struct BufferedWriter<W: Write + Send + 'static> {
    producer: Option<FrameProducer>,
    worker: Option<JoinHandle<WorkerOutcome<W>>>,
    pending: PendingGauge,
    poll_interval: Duration,
    drain_observer: Option<Arc<dyn ProgressCallback>>,
    last_frame: Option<u64>,
}

impl<W: Write + Send + 'static> std::fmt::Debug for BufferedWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedWriter")
            .field("pending", &self.pending.get())
            .field("poll_interval", &self.poll_interval)
            .field("running", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

impl<W: Write + Send + 'static> BufferedWriter<W> {
    /// Start the background thread with a queue of `capacity` frames.
    ///
    /// # Errors
    ///
    /// Returns [`FramePipeError::IoError`] if the thread cannot be spawned.
    pub fn spawn(writer: W, capacity: usize) -> Result<Self, FramePipeError> {
        let (producer, consumer) = PipeBuffer::bounded(capacity);
        let pending = producer.gauge();
        log::debug!("Starting pipe writer thread (capacity={})", producer.capacity());

        let worker = thread::Builder::new()
            .name("framepipe-writer".to_string())
            .spawn(move || write_loop(writer, consumer))?;

        Ok(Self {
            producer: Some(producer),
            worker: Some(worker),
            pending,
            poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
            drain_observer: None,
            last_frame: None,
        })
    }

    /// Set how often [`finish`](FrameSink::finish) checks whether the
    /// background thread is done.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Receive [`ProgressCallback::on_drain`] notifications while finishing.
    #[must_use]
    pub fn with_drain_observer(mut self, observer: Arc<dyn ProgressCallback>) -> Self {
        self.drain_observer = Some(observer);
        self
    }

    /// Frames handed over and not yet written.
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Frames currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.producer.as_ref().map_or(0, FrameProducer::queued)
    }
}

impl<W: Write + Send + 'static> FrameSink for BufferedWriter<W> {
    type Writer = W;

    fn write_frame(&mut self, frame_number: u64, payload: Vec<u8>) -> Result<(), FramePipeError> {
        let stopped = || FramePipeError::PipeWrite {
            frame_number,
            reason: "pipe writer thread has stopped".to_string(),
        };
        let producer = self.producer.as_ref().ok_or_else(stopped)?;
        producer
            .push(QueuedFrame {
                frame_number,
                payload,
            })
            .map_err(|_| stopped())?;
        self.last_frame = Some(frame_number);
        Ok(())
    }

    fn finish(mut self) -> SinkOutcome<W> {
        // Completion signal: the thread drains what is queued, then exits.
        if let Some(producer) = self.producer.take() {
            producer.close();
        }

        let Some(worker) = self.worker.take() else {
            return SinkOutcome {
                writer: None,
                frames_written: 0,
                error: None,
            };
        };

        if self.pending.get() > 0 {
            log::info!("Waiting for the background writer to finish its job...");
        }
        let mut observed = false;
        while !worker.is_finished() {
            if let Some(observer) = &self.drain_observer {
                observer.on_drain(self.pending.get());
                observed = true;
            }
            thread::sleep(self.poll_interval);
        }
        if let Some(observer) = self.drain_observer.as_ref().filter(|_| observed) {
            observer.on_drained();
        }

        match worker.join() {
            Ok(outcome) => SinkOutcome {
                writer: Some(outcome.writer),
                frames_written: outcome.frames_written,
                error: outcome.error,
            },
            Err(_) => SinkOutcome {
                writer: None,
                frames_written: 0,
                error: Some(FramePipeError::PipeWrite {
                    frame_number: self.last_frame.unwrap_or(0),
                    reason: "pipe writer thread panicked".to_string(),
                }),
            },
        }
    }
}

impl<W: Write + Send + 'static> Drop for BufferedWriter<W> {
    fn drop(&mut self) {
        // Only reached without `finish`, e.g. while unwinding.
        self.producer.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn write_loop<W: Write>(mut writer: W, consumer: FrameConsumer) -> WorkerOutcome<W> {
    let mut frames_written = 0;
    let mut last_frame = None;

    while let Some(frame) = consumer.recv() {
        if let Err(error) = writer.write_all(&frame.payload) {
            log::debug!("Pipe writer thread stopping at frame {}: {error}", frame.frame_number);
            // Dropping the consumer unblocks and fails the producer.
            drop(consumer);
            return WorkerOutcome {
                writer,
                frames_written,
                error: Some(write_error(frame.frame_number, &error)),
            };
        }
        consumer.mark_written();
        frames_written += 1;
        last_frame = Some(frame.frame_number);
    }

    let error = writer
        .flush()
        .err()
        .map(|error| write_error(last_frame.unwrap_or(0), &error));
    log::debug!("Pipe writer thread finished after {frames_written} frame(s)");
    WorkerOutcome {
        writer,
        frames_written,
        error,
    }
}

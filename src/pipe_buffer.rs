//! Bounded frame queue between the producing thread and the pipe writer
//! thread.
//!
//! [`PipeBuffer::bounded`] returns the two halves of a FIFO queue:
//!
//! - [`FrameProducer::push`] blocks while the queue is full (backpressure)
//!   and fails once the consumer is gone.
//! - [`FrameConsumer::recv`] blocks until a frame is available and returns
//!   `None` only after the producer was closed *and* every queued frame was
//!   taken, so closing never loses frames.
//!
//! Closing the producer (dropping it) is the completion signal. A separate
//! [`PendingGauge`] counts frames handed over but not yet written; it is
//! informational only and never goes negative.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use crossbeam_channel::{Receiver, Sender};

/// One frame waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    /// Source frame number.
    pub frame_number: u64,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// Shared count of frames handed to the buffer and not yet written.
#[derive(Debug, Clone, Default)]
pub struct PendingGauge(Arc<AtomicUsize>);

impl PendingGauge {
    /// Current value.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    fn decrement(&self) {
        // Saturating: a decrement without a matching increment is a bug, not
        // a reason to wrap.
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| value.checked_sub(1));
    }
}

/// Constructor for the producer/consumer pair.
#[derive(Debug)]
pub struct PipeBuffer;

impl PipeBuffer {
    /// Create a queue holding at most `capacity` frames (minimum 1).
    pub fn bounded(capacity: usize) -> (FrameProducer, FrameConsumer) {
        let capacity = capacity.max(1);
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        let pending = PendingGauge::default();
        (
            FrameProducer {
                sender,
                pending: pending.clone(),
                capacity,
            },
            FrameConsumer { receiver, pending },
        )
    }
}

/// Sending half, owned by the frame-producing thread.
#[derive(Debug)]
pub struct FrameProducer {
    sender: Sender<QueuedFrame>,
    pending: PendingGauge,
    capacity: usize,
}

impl FrameProducer {
    /// Hand a frame to the consumer, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Gives the frame back if the consumer has stopped.
    pub fn push(&self, frame: QueuedFrame) -> Result<(), QueuedFrame> {
        self.pending.increment();
        self.sender.send(frame).map_err(|error| {
            self.pending.decrement();
            error.into_inner()
        })
    }

    /// Frames currently sitting in the queue.
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    /// Maximum number of queued frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// A handle on the pending-frame count that outlives the producer.
    pub fn gauge(&self) -> PendingGauge {
        self.pending.clone()
    }

    /// Signal that no more frames will be pushed.
    pub fn close(self) {
        drop(self);
    }
}

/// Receiving half, owned by the pipe writer thread.
#[derive(Debug)]
pub struct FrameConsumer {
    receiver: Receiver<QueuedFrame>,
    pending: PendingGauge,
}

impl FrameConsumer {
    /// Take the next frame in FIFO order.
    ///
    /// Returns `None` once the producer is closed and the queue is empty.
    pub fn recv(&self) -> Option<QueuedFrame> {
        self.receiver.recv().ok()
    }

    /// Record that the most recently taken frame reached the pipe.
    pub fn mark_written(&self) {
        self.pending.decrement();
    }
}

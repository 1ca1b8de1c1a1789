//! `BoundedQueue`: a byte-sized, back-pressured queue of [`Value`]s. Pairs
//! an `UnboundedSender`/`UnboundedReceiver` with an atomic byte counter the
//! sender checks itself, rather than a slot-counting semaphore the
//! receiver drives: the "permits" here are bytes, not slots, `Enqueue`
//! never blocks (it fails fast instead), and a second, never-refusing
//! `ForceEnqueue` entry point exists for fatal markers.

use std::sync::{
    atomic::{
        AtomicUsize,
        Ordering,
    },
    Arc,
};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::value::Value;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("subscribe output queue exhausted")]
    ResourceExhausted,
    #[error("queue receiver has been dropped")]
    Closed,
}

struct Envelope {
    value: Value,
    size: usize,
}

#[derive(Debug)]
struct Shared {
    max_bytes: usize,
    bytes: AtomicUsize,
}

/// Constructs a bounded queue with the given maximum cumulative byte size.
#[must_use]
pub fn bounded_queue(max_bytes: usize) -> (QueueSender, QueueReceiver) {
    let shared = Arc::new(Shared {
        max_bytes,
        bytes: AtomicUsize::new(0),
    });
    let (tx, rx) = mpsc::unbounded_channel();
    (
        QueueSender {
            shared: shared.clone(),
            tx,
        },
        QueueReceiver {
            shared,
            rx,
        },
    )
}

#[derive(Clone)]
pub struct QueueSender {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl QueueSender {
    /// Enqueues `value`, refusing it with [`QueueError::ResourceExhausted`]
    /// if doing so would bring the queue's cumulative byte size to or past
    /// the configured maximum.
    ///
    /// A value that would bring the cumulative size to exactly `max` is
    /// itself rejected, not just one that would exceed it: rejecting at
    /// `==` is the more conservative reading and keeps the invariant "the
    /// queue never holds `>= max` bytes" exact.
    pub fn enqueue(&self, value: Value) -> Result<(), QueueError> {
        let size = value.encoded_len();
        loop {
            let current = self.shared.bytes.load(Ordering::Acquire);
            let next = current.saturating_add(size);
            if next >= self.shared.max_bytes {
                return Err(QueueError::ResourceExhausted);
            }
            if self
                .shared
                .bytes
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        self.tx
            .send(Envelope {
                value,
                size,
            })
            .map_err(|_| QueueError::Closed)
    }

    /// Enqueues `value` unconditionally, even over the configured maximum.
    /// Reserved for fatal markers and admin pushes that must never be
    /// dropped.
    pub fn force_enqueue(&self, value: Value) {
        let size = value.encoded_len();
        self.shared.bytes.fetch_add(size, Ordering::AcqRel);
        // The receiver side is only ever dropped when the owning RPC has
        // already torn down, at which point there is nothing left to force
        // a fatal marker onto; silently dropping is correct.
        let _ = self.tx.send(Envelope {
            value,
            size,
        });
    }

    #[must_use]
    pub fn bytes_in_flight(&self) -> usize {
        self.shared.bytes.load(Ordering::Acquire)
    }
}

pub struct QueueReceiver {
    shared: Arc<Shared>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl QueueReceiver {
    /// Blocks until one item is available, then returns it, decrementing
    /// the queue's byte count. Returns `None` once every sender has been
    /// dropped.
    pub async fn dequeue(&mut self) -> Option<Value> {
        let envelope = self.rx.recv().await?;
        self.shared.bytes.fetch_sub(envelope.size, Ordering::AcqRel);
        Some(envelope.value)
    }

    #[must_use]
    pub fn bytes_in_flight(&self) -> usize {
        self.shared.bytes.load(Ordering::Acquire)
    }
}

//! Transfer queue decoupling ingestion from the processing loop.
//!
//! Single-reader, multi-writer. Producers enqueue from arbitrary threads
//! without ever blocking the consumer; the consumer's dequeue is the only
//! blocking operation and wakes immediately on cancellation. Producer-side
//! failures travel in-band so the listener hears about them from the
//! dispatch thread, in order.

use crate::chunk::SequencedChunk;
use crate::config::{Backpressure, QueueConfig};
use crate::error::ScribeError;
use crossbeam_channel::{Receiver, Sender, SendTimeoutError, TrySendError, bounded, unbounded};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Cooperative cancellation signal shared between the controller, the
/// ingestion adapter and the processing loop.
///
/// `cancel()` sets a flag and wakes any dequeue blocked in `select`, so
/// shutdown never waits for a new chunk to arrive.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    wake_tx: Sender<()>,
}

impl CancelHandle {
    /// Signals cancellation. Safe to call more than once.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.wake_tx.try_send(());
    }

    /// Returns true once cancellation has been signaled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Error returned by `QueueProducer::enqueue`.
#[derive(Debug)]
pub enum EnqueueError {
    /// Bounded queue stayed full for the whole block timeout. The chunk is
    /// handed back so the producer may retry or drop it.
    Full(SequencedChunk),
    /// The consumer side has been released; no further chunks are accepted.
    Closed,
}

impl fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::Full(_) => write!(f, "transfer queue full"),
            EnqueueError::Closed => write!(f, "transfer queue closed"),
        }
    }
}

impl From<EnqueueError> for ScribeError {
    fn from(e: EnqueueError) -> Self {
        ScribeError::Ingestion {
            message: e.to_string(),
        }
    }
}

/// Producer half of the transfer queue. Cheap to clone; one clone per
/// producer thread.
#[derive(Clone)]
pub struct QueueProducer {
    chunk_tx: Sender<SequencedChunk>,
    // Present only in drop-oldest mode; used to discard the head when full.
    drain_rx: Option<Receiver<SequencedChunk>>,
    block_timeout: Option<Duration>,
    fault_tx: Sender<String>,
    dropped: Arc<AtomicU64>,
}

impl QueueProducer {
    /// Enqueues a chunk according to the configured policy.
    ///
    /// Never blocks in unbounded or drop-oldest mode; waits at most the
    /// configured timeout in bounded-block mode.
    pub fn enqueue(&self, chunk: SequencedChunk) -> Result<(), EnqueueError> {
        if let Some(drain) = &self.drain_rx {
            let mut chunk = chunk;
            loop {
                match self.chunk_tx.try_send(chunk) {
                    Ok(()) => return Ok(()),
                    Err(TrySendError::Full(returned)) => {
                        chunk = returned;
                        if drain.try_recv().is_ok() {
                            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                            warn!(dropped = total, "transfer queue full, dropping oldest chunk");
                        }
                    }
                    Err(TrySendError::Disconnected(_)) => return Err(EnqueueError::Closed),
                }
            }
        }

        if let Some(timeout) = self.block_timeout {
            return match self.chunk_tx.send_timeout(chunk, timeout) {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => Err(EnqueueError::Full(returned)),
                Err(SendTimeoutError::Disconnected(_)) => Err(EnqueueError::Closed),
            };
        }

        // Unbounded: send returns immediately.
        self.chunk_tx.send(chunk).map_err(|_| EnqueueError::Closed)
    }

    /// Reports a producer-side failure in-band.
    ///
    /// The fault slot holds one message; only the first fault per session
    /// is surfaced, which the processing loop turns into exactly one Error
    /// result before terminating.
    pub fn fault(&self, message: impl Into<String>) {
        let _ = self.fault_tx.try_send(message.into());
    }

    /// Number of chunks discarded by the drop-oldest policy so far.
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Outcome of a dequeue attempt.
#[derive(Debug)]
pub enum Dequeue {
    /// A chunk ready for processing.
    Item(SequencedChunk),
    /// A producer-side failure surfaced in-band.
    Fault(String),
    /// Cancellation was signaled; no further items will be returned.
    Cancelled,
    /// All producers are gone and the queue is drained.
    Closed,
}

/// Consumer half of the transfer queue. Owned by the processing loop;
/// there is exactly one consumer per session.
pub struct QueueConsumer {
    chunk_rx: Receiver<SequencedChunk>,
    fault_rx: Receiver<String>,
    wake_rx: Receiver<()>,
    // Keeps the wake channel connected and lets dequeue short-circuit.
    cancel: CancelHandle,
    // Fault observed while chunks were still buffered; surfaced after
    // those chunks drain.
    pending_fault: Option<String>,
}

impl QueueConsumer {
    /// Blocks until a chunk, a fault, cancellation or queue closure.
    ///
    /// Chunks accepted before a fault are delivered before the fault
    /// itself, so results for accepted audio always precede the error.
    pub fn dequeue(&mut self) -> Dequeue {
        if self.cancel.is_cancelled() {
            return Dequeue::Cancelled;
        }

        if let Ok(chunk) = self.chunk_rx.try_recv() {
            return Dequeue::Item(chunk);
        }
        if let Some(message) = self.pending_fault.take() {
            return Dequeue::Fault(message);
        }
        if let Ok(message) = self.fault_rx.try_recv() {
            return Dequeue::Fault(message);
        }

        crossbeam_channel::select! {
            recv(self.wake_rx) -> _ => Dequeue::Cancelled,
            recv(self.fault_rx) -> msg => match msg {
                Ok(message) => match self.chunk_rx.try_recv() {
                    // A chunk raced in ahead of the fault; hold the fault.
                    Ok(chunk) => {
                        self.pending_fault = Some(message);
                        Dequeue::Item(chunk)
                    }
                    Err(_) => Dequeue::Fault(message),
                },
                // Producers gone: hand out whatever is still buffered.
                Err(_) => match self.chunk_rx.try_recv() {
                    Ok(chunk) => Dequeue::Item(chunk),
                    Err(_) => Dequeue::Closed,
                },
            },
            recv(self.chunk_rx) -> chunk => match chunk {
                Ok(chunk) => Dequeue::Item(chunk),
                Err(_) => Dequeue::Closed,
            },
        }
    }
}

/// Opens a transfer queue with the given policy.
///
/// Returns the producer handle (clone per producer thread), the single
/// consumer, and the session's cancellation handle.
pub fn open(config: &QueueConfig) -> (QueueProducer, QueueConsumer, CancelHandle) {
    let (chunk_tx, chunk_rx) = if config.bounded {
        bounded(config.capacity)
    } else {
        unbounded()
    };

    let drain_rx = (config.bounded && config.backpressure == Backpressure::DropOldest)
        .then(|| chunk_rx.clone());
    let block_timeout = (config.bounded && config.backpressure == Backpressure::Block)
        .then(|| Duration::from_millis(config.block_timeout_ms));

    let (fault_tx, fault_rx) = bounded(1);
    let (wake_tx, wake_rx) = bounded(1);

    let cancel = CancelHandle {
        flag: Arc::new(AtomicBool::new(false)),
        wake_tx,
    };

    let producer = QueueProducer {
        chunk_tx,
        drain_rx,
        block_timeout,
        fault_tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };

    let consumer = QueueConsumer {
        chunk_rx,
        fault_rx,
        wake_rx,
        cancel: cancel.clone(),
        pending_fault: None,
    };

    (producer, consumer, cancel)
}

//! Push ingestion: an external source delivers PCM on its own threads.

use crate::chunk::SequencedChunk;
use crate::error::{Result, ScribeError};
use crate::ingest::IngestionAdapter;
use crate::queue::{CancelHandle, EnqueueError, QueueProducer};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

struct PushShared {
    producer: Mutex<Option<QueueProducer>>,
    sequence: AtomicU64,
    failed: AtomicBool,
}

/// Adapter for push-style sources.
///
/// The external source calls [`PushHandle::push`] whenever audio arrives,
/// from any number of threads concurrently. The enqueue either returns
/// immediately (unbounded / drop-oldest queue) or waits a bounded timeout
/// (bounded-block queue); the caller is never blocked indefinitely.
pub struct PushAdapter {
    shared: Arc<PushShared>,
}

impl PushAdapter {
    /// Creates an adapter not yet bound to a session.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(PushShared {
                producer: Mutex::new(None),
                sequence: AtomicU64::new(0),
                failed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a handle the audio source uses to deliver chunks.
    ///
    /// Handles are cheap to clone and remain valid across sessions; a push
    /// while no session is running is rejected, not queued.
    pub fn handle(&self) -> PushHandle {
        PushHandle {
            shared: self.shared.clone(),
        }
    }
}

impl Default for PushAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionAdapter for PushAdapter {
    fn start(&mut self, producer: QueueProducer, _cancel: CancelHandle) -> Result<()> {
        let mut slot = self
            .shared
            .producer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return Err(ScribeError::Lifecycle {
                message: "push adapter is already started".to_string(),
            });
        }
        // Fresh session: sequence numbering restarts
        self.shared.sequence.store(0, Ordering::SeqCst);
        self.shared.failed.store(false, Ordering::SeqCst);
        *slot = Some(producer);
        debug!("push adapter started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut slot = self
            .shared
            .producer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
        debug!("push adapter stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "push"
    }
}

/// Entry point the external push source calls with raw PCM.
#[derive(Clone)]
pub struct PushHandle {
    shared: Arc<PushShared>,
}

impl PushHandle {
    /// Delivers one chunk of PCM to the pipeline.
    ///
    /// Safe to call concurrently from multiple producer threads. A full
    /// bounded-block queue rejects the chunk after the configured timeout
    /// (retryable); a released queue halts the adapter and surfaces one
    /// in-band fault.
    pub fn push(&self, bytes: Vec<u8>) -> Result<()> {
        if self.shared.failed.load(Ordering::SeqCst) {
            return Err(ScribeError::Ingestion {
                message: "push adapter halted after earlier failure".to_string(),
            });
        }

        // Clone the producer out so enqueue never runs under the lock.
        let producer = {
            let slot = self
                .shared
                .producer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.clone()
        };
        let Some(producer) = producer else {
            return Err(ScribeError::Ingestion {
                message: "push adapter is not running".to_string(),
            });
        };

        let sequence = self.shared.sequence.fetch_add(1, Ordering::SeqCst);
        match producer.enqueue(SequencedChunk::new(sequence, bytes)) {
            Ok(()) => Ok(()),
            Err(e @ EnqueueError::Full(_)) => Err(e.into()),
            Err(EnqueueError::Closed) => {
                if !self.shared.failed.swap(true, Ordering::SeqCst) {
                    producer.fault("push source lost its transfer queue");
                }
                Err(EnqueueError::Closed.into())
            }
        }
    }
}

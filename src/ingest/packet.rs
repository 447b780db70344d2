//! Packet ingestion: the caller submits fully-formed, explicitly
//! sequenced chunks and the adapter validates the numbering.

use crate::chunk::SequencedChunk;
use crate::defaults;
use crate::error::{Result, ScribeError};
use crate::ingest::IngestionAdapter;
use crate::queue::{CancelHandle, EnqueueError, QueueProducer};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

struct PacketSession {
    producer: QueueProducer,
    last_sequence: Option<u64>,
    failed: bool,
    // Coalescing buffer; empty when min_batch_bytes is 0
    pending: Vec<u8>,
    pending_sequence: Option<u64>,
}

struct PacketShared {
    session: Mutex<Option<PacketSession>>,
    min_batch_bytes: usize,
}

/// Adapter for out-of-order-tolerant packet submission.
///
/// Gaps in the sequence are tolerated (lost packets are not an error),
/// but duplicates and jumps beyond `defaults::MAX_SEQUENCE_GAP` are
/// rejected with an error and a one-time in-band fault, after which no
/// further packets are accepted. Small packets can optionally be
/// coalesced before being handed to the engine.
pub struct PacketAdapter {
    shared: Arc<PacketShared>,
}

impl PacketAdapter {
    /// Creates an adapter that forwards each packet as its own chunk.
    pub fn new() -> Self {
        Self::with_min_batch_bytes(0)
    }

    /// Creates an adapter that coalesces packets until at least
    /// `min_batch_bytes` are buffered. The emitted chunk carries the
    /// sequence number of its first packet.
    pub fn with_min_batch_bytes(min_batch_bytes: usize) -> Self {
        Self {
            shared: Arc::new(PacketShared {
                session: Mutex::new(None),
                min_batch_bytes,
            }),
        }
    }

    /// Returns the submission handle for the external source.
    pub fn handle(&self) -> PacketHandle {
        PacketHandle {
            shared: self.shared.clone(),
        }
    }
}

impl Default for PacketAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_session(shared: &PacketShared) -> MutexGuard<'_, Option<PacketSession>> {
    shared
        .session
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl IngestionAdapter for PacketAdapter {
    fn start(&mut self, producer: QueueProducer, _cancel: CancelHandle) -> Result<()> {
        let mut slot = lock_session(&self.shared);
        if slot.is_some() {
            return Err(ScribeError::Lifecycle {
                message: "packet adapter is already started".to_string(),
            });
        }
        *slot = Some(PacketSession {
            producer,
            last_sequence: None,
            failed: false,
            pending: Vec::new(),
            pending_sequence: None,
        });
        debug!("packet adapter started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut slot = lock_session(&self.shared);
        if let Some(session) = slot.take() {
            // Flush a coalescing remainder so buffered audio is not lost
            if !session.failed
                && !session.pending.is_empty()
                && let Some(sequence) = session.pending_sequence
            {
                let _ = session
                    .producer
                    .enqueue(SequencedChunk::new(sequence, session.pending));
            }
        }
        debug!("packet adapter stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "packet"
    }
}

/// Synchronous packet submission surface.
#[derive(Clone)]
pub struct PacketHandle {
    shared: Arc<PacketShared>,
}

impl PacketHandle {
    /// Submits one packet with its explicit sequence number.
    ///
    /// Validation and hand-off happen synchronously; a rejected sequence
    /// number returns the error to the caller and halts the adapter after
    /// surfacing one fault to the pipeline.
    pub fn submit(&self, sequence: u64, bytes: Vec<u8>) -> Result<()> {
        let mut slot = lock_session(&self.shared);
        let session = slot.as_mut().ok_or_else(|| ScribeError::Ingestion {
            message: "packet adapter is not running".to_string(),
        })?;

        if session.failed {
            return Err(ScribeError::Ingestion {
                message: "packet adapter halted after earlier failure".to_string(),
            });
        }

        if let Some(last) = session.last_sequence {
            if sequence <= last {
                return fail(
                    session,
                    format!("duplicate sequence number {} (last accepted {})", sequence, last),
                );
            }
            if sequence - last > defaults::MAX_SEQUENCE_GAP {
                return fail(
                    session,
                    format!(
                        "sequence number {} out of range (last accepted {}, max gap {})",
                        sequence,
                        last,
                        defaults::MAX_SEQUENCE_GAP
                    ),
                );
            }
        } else if sequence > defaults::MAX_SEQUENCE_GAP {
            return fail(
                session,
                format!(
                    "initial sequence number {} out of range (max gap {})",
                    sequence,
                    defaults::MAX_SEQUENCE_GAP
                ),
            );
        }

        session.last_sequence = Some(sequence);

        if self.shared.min_batch_bytes > 0 {
            if session.pending.is_empty() {
                session.pending_sequence = Some(sequence);
            }
            session.pending.extend_from_slice(&bytes);
            if session.pending.len() < self.shared.min_batch_bytes {
                return Ok(());
            }
            let batch = std::mem::take(&mut session.pending);
            let batch_sequence = session.pending_sequence.take().unwrap_or(sequence);
            return enqueue(session, SequencedChunk::new(batch_sequence, batch));
        }

        enqueue(session, SequencedChunk::new(sequence, bytes))
    }
}

fn enqueue(session: &mut PacketSession, chunk: SequencedChunk) -> Result<()> {
    match session.producer.enqueue(chunk) {
        Ok(()) => Ok(()),
        // Full is retryable; only queue loss halts the adapter
        Err(e @ EnqueueError::Full(_)) => Err(e.into()),
        Err(EnqueueError::Closed) => {
            fail(session, "packet source lost its transfer queue".to_string())
        }
    }
}

fn fail(session: &mut PacketSession, message: String) -> Result<()> {
    session.failed = true;
    session.producer.fault(message.clone());
    Err(ScribeError::Ingestion { message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::queue::{self, Dequeue, QueueConsumer};

    fn start_adapter() -> (PacketAdapter, PacketHandle, QueueConsumer) {
        let (producer, consumer, cancel) = queue::open(&QueueConfig::default());
        let mut adapter = PacketAdapter::new();
        let handle = adapter.handle();
        adapter.start(producer, cancel).unwrap();
        (adapter, handle, consumer)
    }

    #[test]
    fn test_submit_in_order() {
        let (_adapter, handle, mut consumer) = start_adapter();

        handle.submit(0, vec![1u8; 16]).unwrap();
        handle.submit(1, vec![2u8; 16]).unwrap();
        handle.submit(2, vec![3u8; 16]).unwrap();

        for expected in 0..3 {
            match consumer.dequeue() {
                Dequeue::Item(chunk) => assert_eq!(chunk.sequence, expected),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_gaps_are_tolerated() {
        let (_adapter, handle, mut consumer) = start_adapter();

        handle.submit(0, vec![0u8; 8]).unwrap();
        handle.submit(5, vec![0u8; 8]).unwrap();
        handle.submit(100, vec![0u8; 8]).unwrap();

        let mut sequences = Vec::new();
        for _ in 0..3 {
            match consumer.dequeue() {
                Dequeue::Item(chunk) => sequences.push(chunk.sequence),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(sequences, vec![0, 5, 100]);
    }

    #[test]
    fn test_duplicate_sequence_is_rejected_with_fault() {
        let (_adapter, handle, mut consumer) = start_adapter();

        handle.submit(0, vec![0u8; 8]).unwrap();
        handle.submit(1, vec![0u8; 8]).unwrap();

        let result = handle.submit(1, vec![0u8; 8]);
        assert!(matches!(result, Err(ScribeError::Ingestion { message }) if message.contains("duplicate")));

        // The accepted chunks are still delivered, then the fault
        assert!(matches!(consumer.dequeue(), Dequeue::Item(_)));
        assert!(matches!(consumer.dequeue(), Dequeue::Item(_)));
        match consumer.dequeue() {
            Dequeue::Fault(message) => assert!(message.contains("duplicate")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stale_sequence_is_rejected() {
        let (_adapter, handle, _consumer) = start_adapter();

        handle.submit(10, vec![0u8; 8]).unwrap();
        assert!(handle.submit(3, vec![0u8; 8]).is_err());
    }

    #[test]
    fn test_out_of_range_jump_is_rejected() {
        let (_adapter, handle, _consumer) = start_adapter();

        handle.submit(0, vec![0u8; 8]).unwrap();
        let result = handle.submit(defaults::MAX_SEQUENCE_GAP + 2, vec![0u8; 8]);
        assert!(matches!(result, Err(ScribeError::Ingestion { message }) if message.contains("out of range")));
    }

    #[test]
    fn test_halted_adapter_rejects_further_packets() {
        let (_adapter, handle, _consumer) = start_adapter();

        handle.submit(0, vec![0u8; 8]).unwrap();
        let _ = handle.submit(0, vec![0u8; 8]); // duplicate, halts

        let result = handle.submit(1, vec![0u8; 8]);
        assert!(matches!(result, Err(ScribeError::Ingestion { message }) if message.contains("halted")));
    }

    #[test]
    fn test_submit_before_start_is_rejected() {
        let adapter = PacketAdapter::new();
        let handle = adapter.handle();
        assert!(handle.submit(0, vec![0u8; 8]).is_err());
    }

    #[test]
    fn test_coalescing_batches_small_packets() {
        let (producer, mut consumer, cancel) = queue::open(&QueueConfig::default());
        let mut adapter = PacketAdapter::with_min_batch_bytes(32);
        let handle = adapter.handle();
        adapter.start(producer, cancel).unwrap();

        handle.submit(0, vec![1u8; 16]).unwrap();
        handle.submit(1, vec![2u8; 16]).unwrap(); // reaches 32 bytes

        match consumer.dequeue() {
            Dequeue::Item(chunk) => {
                assert_eq!(chunk.sequence, 0); // first packet of the batch
                assert_eq!(chunk.len(), 32);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_coalescing_remainder_flushed_on_stop() {
        let (producer, mut consumer, cancel) = queue::open(&QueueConfig::default());
        let mut adapter = PacketAdapter::with_min_batch_bytes(1024);
        let handle = adapter.handle();
        adapter.start(producer, cancel).unwrap();

        handle.submit(0, vec![7u8; 10]).unwrap();
        adapter.stop().unwrap();

        match consumer.dequeue() {
            Dequeue::Item(chunk) => {
                assert_eq!(chunk.sequence, 0);
                assert_eq!(chunk.len(), 10);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

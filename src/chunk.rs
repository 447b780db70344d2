//! The normalized unit of audio flowing through the pipeline.

use crate::config::AudioFormat;
use std::time::Instant;

/// A sequenced slice of raw PCM with capture metadata.
///
/// Owned exclusively by whichever stage currently holds it; ownership
/// transfers on enqueue/dequeue, so no stage ever mutates a chunk that
/// another stage can still see.
#[derive(Debug, Clone)]
pub struct SequencedChunk {
    /// Sequence number, strictly increasing within one ingestion session.
    pub sequence: u64,
    /// Capture timestamp. Monotonic but not required to be gap-free.
    pub timestamp: Instant,
    /// Raw PCM payload.
    pub bytes: Vec<u8>,
}

impl SequencedChunk {
    /// Creates a new chunk stamped with the current time.
    pub fn new(sequence: u64, bytes: Vec<u8>) -> Self {
        Self {
            sequence,
            timestamp: Instant::now(),
            bytes,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the duration of this chunk in milliseconds for the given format.
    pub fn duration_ms(&self, format: &AudioFormat) -> u32 {
        let per_second = format.bytes_per_second();
        if per_second == 0 {
            return 0;
        }
        (self.bytes.len() as u64 * 1000 / per_second as u64) as u32
    }
}

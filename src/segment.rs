//! Segment accumulator: decides when a partial hypothesis becomes final.

use crate::config::SegmentConfig;
use crate::dispatch::TranscriptionResult;
use crate::engine::EngineOutput;

/// Accumulates engine output across chunks and emits partial/final results.
///
/// Every absorbed chunk yields a partial carrying the accumulated
/// hypothesis. A final is emitted at a segment boundary: after
/// `final_cadence` chunks, or earlier when the engine signals
/// end-of-utterance. Finalizing resets the context and the cadence
/// counter, so the two triggers compose rather than race.
pub struct SegmentAccumulator {
    final_cadence: usize,
    context: String,
    chunks_in_segment: usize,
}

impl SegmentAccumulator {
    /// Creates an accumulator with the given boundary policy.
    pub fn new(config: &SegmentConfig) -> Self {
        Self {
            final_cadence: config.final_cadence.max(1),
            context: String::new(),
            chunks_in_segment: 0,
        }
    }

    /// Text accumulated so far in the current segment.
    ///
    /// Passed back to the engine as running context on the next chunk.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Absorbs one engine output and returns the results to dispatch,
    /// in delivery order.
    pub fn absorb(&mut self, output: EngineOutput) -> Vec<TranscriptionResult> {
        let text = output.text.trim();
        if !text.is_empty() {
            if !self.context.is_empty() {
                self.context.push(' ');
            }
            self.context.push_str(text);
        }
        self.chunks_in_segment += 1;

        let mut results = vec![TranscriptionResult::Partial(self.context.clone())];

        if output.end_of_utterance || self.chunks_in_segment >= self.final_cadence {
            results.push(TranscriptionResult::Final(std::mem::take(&mut self.context)));
            self.chunks_in_segment = 0;
        }

        results
    }

    /// Finalizes a trailing partial segment, if any.
    ///
    /// Used by the batch path when the buffer is exhausted. The streaming
    /// path never flushes on cancellation: stop means no further results.
    pub fn flush(&mut self) -> Option<TranscriptionResult> {
        if self.chunks_in_segment == 0 {
            return None;
        }
        self.chunks_in_segment = 0;
        Some(TranscriptionResult::Final(std::mem::take(&mut self.context)))
    }
}

//! Batch transcription of a complete, already-captured buffer.
//!
//! Reuses the streaming accumulator over fixed windows of the buffer, so
//! batch and streaming share segmentation semantics. One job runs at a
//! time per instance; a second request while a job is active is rejected
//! rather than queued.

use crate::audio::wav;
use crate::config::{AudioFormat, PipelineConfig, SegmentConfig};
use crate::defaults;
use crate::dispatch::{self, TranscriptionListener};
use crate::engine::TranscriptionEngine;
use crate::error::{Result, ScribeError};
use crate::segment::SegmentAccumulator;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

// Releases the busy slot when the blocking job finishes, even if the
// caller dropped its future mid-flight or the job panicked.
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One-shot transcriber for whole PCM buffers.
pub struct BatchTranscriber<E: TranscriptionEngine + 'static> {
    engine: Arc<E>,
    format: AudioFormat,
    segment: SegmentConfig,
    window_bytes: usize,
    active: Arc<AtomicBool>,
    cancel_requested: Arc<AtomicBool>,
}

impl<E: TranscriptionEngine + 'static> BatchTranscriber<E> {
    /// Creates a batch transcriber over the given engine and config.
    pub fn new(engine: E, config: &PipelineConfig) -> Self {
        let bytes_per_frame = config.audio.bytes_per_frame().max(1) as usize;
        let raw = config.audio.bytes_per_second() as u64 * defaults::BATCH_WINDOW_MS as u64 / 1000;
        // Whole frames only, and never a zero-length window
        let window_bytes = ((raw as usize / bytes_per_frame).max(1)) * bytes_per_frame;

        Self {
            engine: Arc::new(engine),
            format: config.audio.clone(),
            segment: config.segment.clone(),
            window_bytes,
            active: Arc::new(AtomicBool::new(false)),
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns true while a job is running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Requests cancellation of the running job.
    ///
    /// No-op when no job is active; an idle cancel does not poison the
    /// next job. The job stops at the next window boundary and the buffer
    /// tail stays untranscribed, with no trailing final.
    pub fn cancel(&self) {
        if self.active.load(Ordering::SeqCst) {
            self.cancel_requested.store(true, Ordering::SeqCst);
        }
    }

    /// Transcribes a complete PCM buffer, delivering results to the
    /// listener as windows complete.
    ///
    /// Returns `Busy` if a job is already running. The engine calls run on
    /// a blocking worker so the async caller is not pinned.
    pub async fn transcribe_buffer(
        &self,
        pcm: Vec<u8>,
        listener: Box<dyn TranscriptionListener>,
    ) -> Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(ScribeError::Busy {
                message: "a batch transcription is already running".to_string(),
            });
        }
        self.cancel_requested.store(false, Ordering::SeqCst);

        let engine = self.engine.clone();
        let format = self.format.clone();
        let mut accumulator = SegmentAccumulator::new(&self.segment);
        let window_bytes = self.window_bytes;
        let cancel = self.cancel_requested.clone();
        let slot = SlotGuard(self.active.clone());

        debug!(bytes = pcm.len(), window_bytes, "batch transcription started");

        let outcome = tokio::task::spawn_blocking(move || {
            // The slot stays claimed for as long as the work runs, and no
            // longer; dropping the caller's future must not wedge it.
            let _slot = slot;
            for window in pcm.chunks(window_bytes) {
                if cancel.load(Ordering::SeqCst) {
                    debug!("batch transcription cancelled");
                    return Ok(());
                }
                match engine.transcribe(window, &format, accumulator.context()) {
                    Ok(output) => {
                        for result in accumulator.absorb(output) {
                            dispatch::deliver(listener.as_ref(), &result);
                        }
                    }
                    Err(e) => {
                        listener.on_error(&e.to_string());
                        return Err(e);
                    }
                }
            }

            // Trailing partial segment becomes the closing final
            if !cancel.load(Ordering::SeqCst)
                && let Some(result) = accumulator.flush()
            {
                dispatch::deliver(listener.as_ref(), &result);
            }
            Ok(())
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(ScribeError::Engine {
                message: "batch transcription task panicked".to_string(),
            }),
        }
    }

    /// Decodes a WAV stream to the configured format and transcribes it.
    pub async fn transcribe_wav(
        &self,
        reader: impl Read,
        listener: Box<dyn TranscriptionListener>,
    ) -> Result<()> {
        let pcm = wav::decode_to_pcm(reader, &self.format)?;
        self.transcribe_buffer(pcm, listener).await
    }
}

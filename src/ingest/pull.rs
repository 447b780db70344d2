//! Pull ingestion: a dedicated thread reads a blocking byte source.

use crate::chunk::SequencedChunk;
use crate::defaults;
use crate::error::{Result, ScribeError};
use crate::ingest::IngestionAdapter;
use crate::queue::{CancelHandle, EnqueueError, QueueProducer};
use crossbeam_channel::{Receiver, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

/// Trait for blocking readable byte sources (the capture collaborator).
///
/// Reads should be reasonably short so the pull thread can observe
/// cancellation promptly; a zero-byte read means "nothing buffered yet",
/// not end of stream.
pub trait ByteSource: Send {
    /// Start producing bytes.
    fn start(&mut self) -> Result<()>;

    /// Stop producing bytes.
    fn stop(&mut self) -> Result<()>;

    /// Read the next slice of raw PCM. Blocking; may return empty.
    fn read(&mut self) -> Result<Vec<u8>>;
}

/// Adapter that owns a read thread over a [`ByteSource`].
///
/// The source moves into the thread on start, so the thread is the only
/// stage touching it; `stop` waits (bounded) for the thread to exit, which
/// also stops the source. One adapter drives one session; a new session
/// takes a fresh adapter.
pub struct PullAdapter {
    source: Option<Box<dyn ByteSource>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    done_rx: Option<Receiver<()>>,
}

impl PullAdapter {
    /// Creates an adapter over the given source.
    pub fn new(source: impl ByteSource + 'static) -> Self {
        Self {
            source: Some(Box::new(source)),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            done_rx: None,
        }
    }

    /// Creates an adapter over an already-boxed source.
    pub fn from_boxed(source: Box<dyn ByteSource>) -> Self {
        Self {
            source: Some(source),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            done_rx: None,
        }
    }
}

impl IngestionAdapter for PullAdapter {
    fn start(&mut self, producer: QueueProducer, cancel: CancelHandle) -> Result<()> {
        let mut source = self.source.take().ok_or_else(|| ScribeError::Lifecycle {
            message: "pull adapter consumed its source; use a fresh adapter per session"
                .to_string(),
        })?;

        source.start()?;
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let (done_tx, done_rx) = bounded(1);
        let idle = Duration::from_millis(defaults::IDLE_POLL_MS);

        let handle = thread::Builder::new()
            .name("streamscribe-pull".to_string())
            .spawn(move || {
                let mut sequence = 0u64;

                'read: while running.load(Ordering::SeqCst) && !cancel.is_cancelled() {
                    match source.read() {
                        Ok(bytes) if !bytes.is_empty() => {
                            let mut chunk = SequencedChunk::new(sequence, bytes);
                            loop {
                                match producer.enqueue(chunk) {
                                    Ok(()) => {
                                        sequence += 1;
                                        break;
                                    }
                                    Err(EnqueueError::Full(returned)) => {
                                        // Backpressure: retry until cancelled
                                        if !running.load(Ordering::SeqCst) || cancel.is_cancelled()
                                        {
                                            break 'read;
                                        }
                                        chunk = returned;
                                    }
                                    Err(EnqueueError::Closed) => {
                                        producer.fault("pull source lost its transfer queue");
                                        break 'read;
                                    }
                                }
                            }
                        }
                        Ok(_) => {
                            // Nothing buffered yet, idle briefly instead of spinning
                            thread::sleep(idle);
                        }
                        Err(e) => {
                            error!(error = %e, "pull source read failed");
                            producer.fault(format!("read failed: {}", e));
                            break;
                        }
                    }
                }

                if let Err(e) = source.stop() {
                    error!(error = %e, "pull source stop failed");
                }
                debug!("pull thread exited");
                let _ = done_tx.send(());
            })
            .map_err(|e| ScribeError::Ingestion {
                message: format!("failed to spawn pull thread: {}", e),
            })?;

        self.thread = Some(handle);
        self.done_rx = Some(done_rx);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);

        let Some(done_rx) = self.done_rx.take() else {
            return Ok(());
        };

        match done_rx.recv_timeout(Duration::from_millis(defaults::STOP_TIMEOUT_MS)) {
            Ok(()) => {
                if let Some(handle) = self.thread.take() {
                    let _ = handle.join();
                }
                Ok(())
            }
            Err(_) => Err(ScribeError::Lifecycle {
                message: format!(
                    "pull thread did not exit within {}ms",
                    defaults::STOP_TIMEOUT_MS
                ),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "pull"
    }
}

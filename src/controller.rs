//! Pipeline controller: lifecycle state machine and processing loop.
//!
//! Owns the transfer queue, the ingestion adapter and the processing
//! thread for one session at a time. All state transitions are serialized
//! behind one mutex, so two concurrent `start` calls cannot both succeed
//! and `stop` races cleanly with status queries.

use crate::config::{AudioFormat, PipelineConfig};
use crate::defaults;
use crate::dispatch::{ResultDispatcher, TranscriptionListener, TranscriptionResult};
use crate::engine::TranscriptionEngine;
use crate::error::{Result, ScribeError};
use crate::ingest::IngestionAdapter;
use crate::queue::{self, CancelHandle, Dequeue, QueueConsumer};
use crate::segment::SegmentAccumulator;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Lifecycle state of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Configured,
    Running,
    Stopping,
    Stopped,
}

struct Session {
    cancel: CancelHandle,
    adapter: Box<dyn IngestionAdapter>,
    loop_thread: Option<JoinHandle<()>>,
    done_rx: Receiver<()>,
}

struct Inner {
    state: PipelineState,
    config: Option<PipelineConfig>,
    session: Option<Session>,
}

/// Streaming transcription pipeline.
///
/// Generic over the engine so real and mock engines share the exact same
/// control flow. One processing loop runs per `start`/`stop` period; a
/// stopped pipeline can be started again for a fresh session.
pub struct Pipeline<E: TranscriptionEngine + 'static> {
    engine: Arc<E>,
    dispatcher: Arc<ResultDispatcher>,
    inner: Mutex<Inner>,
}

impl<E: TranscriptionEngine + 'static> Pipeline<E> {
    /// Creates a pipeline around the given engine.
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
            dispatcher: Arc::new(ResultDispatcher::new()),
            inner: Mutex::new(Inner {
                state: PipelineState::Uninitialized,
                config: None,
                session: None,
            }),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers the result listener, replacing any prior one.
    pub fn register_listener(&self, listener: Box<dyn TranscriptionListener>) {
        self.dispatcher.register(listener);
    }

    /// Removes the registered listener.
    pub fn clear_listener(&self) {
        self.dispatcher.clear();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.lock_inner().state
    }

    /// Validates and stores the configuration.
    ///
    /// Allowed while no session is active; fails with a lifecycle error
    /// when Running or Stopping. Invalid values fail here, never later.
    pub fn initialize(&self, config: PipelineConfig) -> Result<()> {
        config.validate()?;

        let mut inner = self.lock_inner();
        match inner.state {
            PipelineState::Running | PipelineState::Stopping => Err(ScribeError::Lifecycle {
                message: format!("cannot initialize while {:?}", inner.state),
            }),
            _ => {
                inner.config = Some(config);
                inner.state = PipelineState::Configured;
                debug!("pipeline configured");
                Ok(())
            }
        }
    }

    /// Starts a session: allocates the transfer queue, spawns the
    /// processing loop and starts the ingestion adapter.
    ///
    /// Fails with a lifecycle error before `initialize` or while a
    /// session is already active. Held under the state mutex end to end,
    /// so concurrent `start` calls serialize and only one can succeed.
    pub fn start(&self, mut adapter: Box<dyn IngestionAdapter>) -> Result<()> {
        let mut inner = self.lock_inner();

        match inner.state {
            PipelineState::Configured | PipelineState::Stopped => {}
            PipelineState::Uninitialized => {
                return Err(ScribeError::Lifecycle {
                    message: "start called before initialize".to_string(),
                });
            }
            PipelineState::Running => {
                return Err(ScribeError::Lifecycle {
                    message: "pipeline is already running".to_string(),
                });
            }
            PipelineState::Stopping => {
                return Err(ScribeError::Lifecycle {
                    message: "pipeline is stopping".to_string(),
                });
            }
        }

        let config = inner.config.clone().ok_or_else(|| ScribeError::Lifecycle {
            message: "no configuration present".to_string(),
        })?;

        let (producer, consumer, cancel) = queue::open(&config.queue);
        let (done_tx, done_rx) = bounded(1);

        let engine = self.engine.clone();
        let dispatcher = self.dispatcher.clone();
        let accumulator = SegmentAccumulator::new(&config.segment);
        let format = config.audio.clone();
        let loop_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name("streamscribe-loop".to_string())
            .spawn(move || {
                run_loop(
                    consumer,
                    engine,
                    dispatcher,
                    accumulator,
                    format,
                    loop_cancel,
                    done_tx,
                );
            })
            .map_err(|e| ScribeError::Lifecycle {
                message: format!("failed to spawn processing loop: {}", e),
            })?;

        if let Err(e) = adapter.start(producer, cancel.clone()) {
            // Unwind: wake the loop and wait for it before reporting
            cancel.cancel();
            let _ = done_rx.recv_timeout(Duration::from_millis(defaults::STOP_TIMEOUT_MS));
            let _ = handle.join();
            return Err(e);
        }

        debug!(adapter = adapter.name(), "pipeline started");
        inner.state = PipelineState::Running;
        inner.session = Some(Session {
            cancel,
            adapter,
            loop_thread: Some(handle),
            done_rx,
        });
        Ok(())
    }

    /// Stops the active session.
    ///
    /// In order: signal cancellation, stop the ingestion adapter and its
    /// source, wait (bounded) for the processing loop to exit, release the
    /// queue. Idempotent: a second call, or a call before any start, is a
    /// no-op success. After `stop` returns Ok, no further listener
    /// callbacks occur.
    pub fn stop(&self) -> Result<()> {
        let session = {
            let mut inner = self.lock_inner();
            if inner.state != PipelineState::Running {
                return Ok(());
            }
            inner.state = PipelineState::Stopping;
            inner.session.take()
        };

        let Some(mut session) = session else {
            self.lock_inner().state = PipelineState::Stopped;
            return Ok(());
        };

        // (a) cooperative cancellation wakes the blocked dequeue
        session.cancel.cancel();

        // (b) stop the capture/read source
        let adapter_result = session.adapter.stop();

        // (c) bounded wait for the loop to observe cancellation
        let loop_result = match session
            .done_rx
            .recv_timeout(Duration::from_millis(defaults::STOP_TIMEOUT_MS))
        {
            Ok(()) => {
                if let Some(handle) = session.loop_thread.take() {
                    let _ = handle.join();
                }
                Ok(())
            }
            Err(_) => {
                error!(
                    timeout_ms = defaults::STOP_TIMEOUT_MS,
                    "processing loop did not exit in time"
                );
                Err(ScribeError::Lifecycle {
                    message: format!(
                        "processing loop did not exit within {}ms",
                        defaults::STOP_TIMEOUT_MS
                    ),
                })
            }
        };

        // (d) release the transfer queue
        drop(session);

        self.lock_inner().state = PipelineState::Stopped;
        debug!("pipeline stopped");

        adapter_result?;
        loop_result
    }
}

impl<E: TranscriptionEngine + 'static> Drop for Pipeline<E> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Processing loop body: the single consumer of the transfer queue.
///
/// Suspends only at the dequeue and inside the engine call; no lock is
/// held across either. Exits on cancellation, queue closure, an in-band
/// fault, or an engine failure (fatal to the session; audio context
/// would be stale after a retry).
fn run_loop<E: TranscriptionEngine>(
    mut consumer: QueueConsumer,
    engine: Arc<E>,
    dispatcher: Arc<ResultDispatcher>,
    mut accumulator: SegmentAccumulator,
    format: AudioFormat,
    cancel: CancelHandle,
    done_tx: Sender<()>,
) {
    loop {
        match consumer.dequeue() {
            Dequeue::Item(chunk) => {
                trace!(
                    sequence = chunk.sequence,
                    bytes = chunk.len(),
                    "processing chunk"
                );
                let outcome = engine.transcribe(&chunk.bytes, &format, accumulator.context());
                // Anything finished after cancellation stays undelivered
                if cancel.is_cancelled() {
                    break;
                }
                match outcome {
                    Ok(output) => {
                        for result in accumulator.absorb(output) {
                            dispatcher.dispatch(result);
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "engine failure, terminating session");
                        dispatcher.dispatch(TranscriptionResult::Error(e.to_string()));
                        break;
                    }
                }
            }
            Dequeue::Fault(message) => {
                error!(fault = %message, "ingestion fault, terminating session");
                dispatcher.dispatch(TranscriptionResult::Error(message));
                break;
            }
            Dequeue::Cancelled => {
                debug!("processing loop cancelled");
                break;
            }
            Dequeue::Closed => {
                debug!("transfer queue closed");
                break;
            }
        }
    }

    let _ = done_tx.send(());
}

//! streamscribe - Streaming PCM transcription pipeline
//!
//! Sequenced chunks flow from an ingestion adapter through a transfer
//! queue into a transcription engine; partial and final results reach a
//! registered listener in processing order. A batch path transcribes
//! complete buffers with the same segmentation semantics.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod batch;
pub mod chunk;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod queue;
pub mod segment;

// Core traits (source → transcribe → listen)
pub use engine::{EngineOutput, TranscriptionEngine};
pub use dispatch::{CollectingListener, TranscriptionListener, TranscriptionResult};
pub use ingest::{ByteSource, IngestionAdapter};

// Pipeline
pub use batch::BatchTranscriber;
pub use chunk::SequencedChunk;
pub use controller::{Pipeline, PipelineState};
pub use ingest::{PacketAdapter, PacketHandle, PullAdapter, PushAdapter, PushHandle};

// Error handling
pub use error::{Result, ScribeError};

// Config
pub use config::{AudioFormat, Backpressure, PipelineConfig, QueueConfig, SegmentConfig};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

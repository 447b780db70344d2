//! Default configuration constants for streamscribe.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Default channel count (mono).
pub const CHANNELS: u16 = 1;

/// Default bits per sample (16-bit signed PCM).
pub const BITS_PER_SAMPLE: u16 = 16;

/// Default engine model alias.
///
/// "base" (multilingual) supports auto-detection of any language.
pub const DEFAULT_MODEL: &str = "base";

/// Default language code for transcription.
///
/// "auto" lets the engine detect the spoken language automatically.
/// Set to a specific code (e.g., "en", "de") to force a language.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Default number of processed chunks per confirmed ("final") segment.
///
/// The accumulator emits a final result every N chunks unless the engine
/// signals an utterance boundary first. Tune upward for longer segments.
pub const FINAL_CADENCE: usize = 5;

/// Idle wait in milliseconds when a pull source returns no data.
///
/// A zero-byte read means the source has nothing buffered yet; the pull
/// thread sleeps this long before retrying instead of busy-spinning.
pub const IDLE_POLL_MS: u64 = 10;

/// Bounded wait in milliseconds for the processing loop to observe
/// cancellation during `stop()`.
///
/// A loop that has not exited within this window is reported as a
/// lifecycle error rather than silently abandoned.
pub const STOP_TIMEOUT_MS: u64 = 2000;

/// Default capacity of the transfer queue when bounded mode is enabled.
pub const QUEUE_CAPACITY: usize = 256;

/// Default producer-side wait in milliseconds when a bounded queue is
/// full and the backpressure mode is `Block`.
pub const ENQUEUE_TIMEOUT_MS: u64 = 50;

/// Maximum forward jump accepted between packet sequence numbers.
///
/// Gaps are tolerated (lost packets are not an error) but a jump beyond
/// this bound indicates a corrupted or misnumbered producer.
pub const MAX_SEQUENCE_GAP: u64 = 1024;

/// Window length in milliseconds used to slice a batch buffer before
/// handing each window to the engine.
pub const BATCH_WINDOW_MS: u32 = 100;

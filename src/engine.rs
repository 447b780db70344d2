use crate::config::AudioFormat;
use crate::error::{Result, ScribeError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Output of a single engine invocation.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    /// Transcribed text for the audio window.
    pub text: String,
    /// True when the engine detected an utterance boundary; the
    /// accumulator finalizes the current segment early.
    pub end_of_utterance: bool,
}

impl EngineOutput {
    /// Creates an output carrying text with no utterance boundary.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end_of_utterance: false,
        }
    }

    /// Marks this output as an utterance boundary.
    pub fn with_end_of_utterance(mut self) -> Self {
        self.end_of_utterance = true;
        self
    }
}

/// Trait for the transcription engine collaborator.
///
/// The engine maps an audio window plus accumulated context to text.
/// Implementations are opaque to the pipeline and swappable (real model
/// vs mock). The call may be slow and blocking; the pipeline never holds
/// a lock while invoking it.
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe one window of raw PCM.
    ///
    /// # Arguments
    /// * `pcm` - Raw PCM bytes in the given format
    /// * `format` - Sample rate, channel count and bit depth of `pcm`
    /// * `context` - Text accumulated so far in the current segment
    fn transcribe(&self, pcm: &[u8], format: &AudioFormat, context: &str) -> Result<EngineOutput>;

    /// Get the alias of the loaded model.
    fn model_alias(&self) -> &str;

    /// Check if the engine is ready to transcribe.
    fn is_ready(&self) -> bool;
}

/// Implement TranscriptionEngine for Arc<T> to allow sharing across sessions.
impl<T: TranscriptionEngine> TranscriptionEngine for Arc<T> {
    fn transcribe(&self, pcm: &[u8], format: &AudioFormat, context: &str) -> Result<EngineOutput> {
        (**self).transcribe(pcm, format, context)
    }

    fn model_alias(&self) -> &str {
        (**self).model_alias()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Mock engine for testing.
///
/// Returns scripted responses per call and can be configured to fail or
/// to signal utterance boundaries at a fixed interval.
pub struct MockEngine {
    model_alias: String,
    responses: Vec<String>,
    calls: AtomicUsize,
    should_fail: bool,
    fail_after: Option<usize>,
    end_of_utterance_every: Option<usize>,
}

impl MockEngine {
    /// Create a new mock engine with default settings.
    pub fn new(model_alias: &str) -> Self {
        Self {
            model_alias: model_alias.to_string(),
            responses: vec!["mock transcription".to_string()],
            calls: AtomicUsize::new(0),
            should_fail: false,
            fail_after: None,
            end_of_utterance_every: None,
        }
    }

    /// Configure the mock to return a specific response on every call.
    pub fn with_response(mut self, response: &str) -> Self {
        self.responses = vec![response.to_string()];
        self
    }

    /// Configure the mock to cycle through a list of responses.
    pub fn with_responses(mut self, responses: Vec<String>) -> Self {
        if !responses.is_empty() {
            self.responses = responses;
        }
        self
    }

    /// Configure the mock to fail on every transcribe call.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock to start failing after N successful calls.
    pub fn with_failure_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Configure the mock to signal end-of-utterance every N calls.
    pub fn with_end_of_utterance_every(mut self, calls: usize) -> Self {
        if calls > 0 {
            self.end_of_utterance_every = Some(calls);
        }
        self
    }

    /// Number of transcribe calls observed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TranscriptionEngine for MockEngine {
    fn transcribe(&self, _pcm: &[u8], _format: &AudioFormat, _context: &str) -> Result<EngineOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if self.should_fail || self.fail_after.is_some_and(|n| call >= n) {
            return Err(ScribeError::Engine {
                message: "mock engine failure".to_string(),
            });
        }

        let text = self.responses[call % self.responses.len()].clone();
        let end_of_utterance = self
            .end_of_utterance_every
            .is_some_and(|n| (call + 1) % n == 0);

        Ok(EngineOutput {
            text,
            end_of_utterance,
        })
    }

    fn model_alias(&self) -> &str {
        &self.model_alias
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}

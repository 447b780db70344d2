//! Ordered delivery of transcription results to the registered listener.

use std::sync::{Arc, Mutex, MutexGuard};

/// A transcription result flowing out of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionResult {
    /// Hypothesis for audio processed so far, subject to revision.
    Partial(String),
    /// Confirmed transcription for a completed segment, never revised.
    Final(String),
    /// A session-fatal failure, delivered instead of being thrown across
    /// the listener boundary.
    Error(String),
}

impl TranscriptionResult {
    /// The carried text or error message.
    pub fn text(&self) -> &str {
        match self {
            TranscriptionResult::Partial(t)
            | TranscriptionResult::Final(t)
            | TranscriptionResult::Error(t) => t,
        }
    }

    /// Returns true for the Partial variant.
    pub fn is_partial(&self) -> bool {
        matches!(self, TranscriptionResult::Partial(_))
    }

    /// Returns true for the Final variant.
    pub fn is_final(&self) -> bool {
        matches!(self, TranscriptionResult::Final(_))
    }

    /// Returns true for the Error variant.
    pub fn is_error(&self) -> bool {
        matches!(self, TranscriptionResult::Error(_))
    }
}

/// Callback surface for transcription results.
///
/// Callbacks for one pipeline instance are never invoked concurrently;
/// delivery order matches processing order.
pub trait TranscriptionListener: Send {
    /// Incremental hypothesis for the current segment.
    fn on_partial(&self, text: &str);
    /// Confirmed text for a completed segment.
    fn on_final(&self, text: &str);
    /// Session-fatal failure.
    fn on_error(&self, message: &str);
}

/// Routes one result to the matching listener callback.
pub fn deliver(listener: &dyn TranscriptionListener, result: &TranscriptionResult) {
    match result {
        TranscriptionResult::Partial(text) => listener.on_partial(text),
        TranscriptionResult::Final(text) => listener.on_final(text),
        TranscriptionResult::Error(message) => listener.on_error(message),
    }
}

/// Holds the registered listener and serializes delivery to it.
///
/// The listener lives in an exclusively-owned slot: registering replaces
/// any prior listener atomically, and nothing is owed to a replaced
/// listener. Dispatch holds the slot lock across the callback, so no two
/// callbacks for the same dispatcher are ever in flight at once even when
/// the producing side is multi-threaded.
pub struct ResultDispatcher {
    listener: Mutex<Option<Box<dyn TranscriptionListener>>>,
}

impl ResultDispatcher {
    /// Creates a dispatcher with no listener registered.
    pub fn new() -> Self {
        Self {
            listener: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Box<dyn TranscriptionListener>>> {
        // A panicking listener must not wedge delivery for the session.
        self.listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a listener, replacing any prior one.
    pub fn register(&self, listener: Box<dyn TranscriptionListener>) {
        *self.slot() = Some(listener);
    }

    /// Removes the registered listener, if any.
    pub fn clear(&self) {
        *self.slot() = None;
    }

    /// Returns true if a listener is currently registered.
    pub fn has_listener(&self) -> bool {
        self.slot().is_some()
    }

    /// Delivers one result to the registered listener, if any.
    pub fn dispatch(&self, result: TranscriptionResult) {
        let guard = self.slot();
        if let Some(listener) = guard.as_ref() {
            deliver(listener.as_ref(), &result);
        }
    }
}

impl Default for ResultDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener that records every delivered result, for tests and tools.
#[derive(Clone, Default)]
pub struct CollectingListener {
    events: Arc<Mutex<Vec<TranscriptionResult>>>,
}

impl CollectingListener {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far, in order.
    pub fn events(&self) -> Vec<TranscriptionResult> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of results delivered so far.
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Returns true if nothing has been delivered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, result: TranscriptionResult) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(result);
    }
}

impl TranscriptionListener for CollectingListener {
    fn on_partial(&self, text: &str) {
        self.record(TranscriptionResult::Partial(text.to_string()));
    }

    fn on_final(&self, text: &str) {
        self.record(TranscriptionResult::Final(text.to_string()));
    }

    fn on_error(&self, message: &str) {
        self.record(TranscriptionResult::Error(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_accessors() {
        let partial = TranscriptionResult::Partial("a".to_string());
        assert!(partial.is_partial());
        assert!(!partial.is_final());
        assert_eq!(partial.text(), "a");

        let fin = TranscriptionResult::Final("b".to_string());
        assert!(fin.is_final());

        let err = TranscriptionResult::Error("boom".to_string());
        assert!(err.is_error());
        assert_eq!(err.text(), "boom");
    }

    #[test]
    fn test_dispatch_routes_to_matching_callback() {
        let dispatcher = ResultDispatcher::new();
        let listener = CollectingListener::new();
        dispatcher.register(Box::new(listener.clone()));

        dispatcher.dispatch(TranscriptionResult::Partial("one".to_string()));
        dispatcher.dispatch(TranscriptionResult::Final("two".to_string()));
        dispatcher.dispatch(TranscriptionResult::Error("three".to_string()));

        let events = listener.events();
        assert_eq!(events.len(), 3);
        assert!(events[0].is_partial());
        assert!(events[1].is_final());
        assert!(events[2].is_error());
    }

    #[test]
    fn test_dispatch_without_listener_is_noop() {
        let dispatcher = ResultDispatcher::new();
        assert!(!dispatcher.has_listener());
        // Must not panic
        dispatcher.dispatch(TranscriptionResult::Partial("ignored".to_string()));
    }

    #[test]
    fn test_register_replaces_prior_listener() {
        let dispatcher = ResultDispatcher::new();
        let first = CollectingListener::new();
        let second = CollectingListener::new();

        dispatcher.register(Box::new(first.clone()));
        dispatcher.dispatch(TranscriptionResult::Partial("to first".to_string()));

        dispatcher.register(Box::new(second.clone()));
        dispatcher.dispatch(TranscriptionResult::Partial("to second".to_string()));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second.events()[0].text(), "to second");
    }

    #[test]
    fn test_clear_removes_listener() {
        let dispatcher = ResultDispatcher::new();
        let listener = CollectingListener::new();

        dispatcher.register(Box::new(listener.clone()));
        dispatcher.clear();
        assert!(!dispatcher.has_listener());

        dispatcher.dispatch(TranscriptionResult::Final("dropped".to_string()));
        assert!(listener.is_empty());
    }

    #[test]
    fn test_collecting_listener_preserves_order() {
        let listener = CollectingListener::new();

        for i in 0..5 {
            listener.on_partial(&format!("p{}", i));
        }
        listener.on_final("done");

        let events = listener.events();
        assert_eq!(events.len(), 6);
        for (i, event) in events.iter().take(5).enumerate() {
            assert_eq!(event.text(), format!("p{}", i));
        }
        assert!(events[5].is_final());
    }

    #[test]
    fn test_deliver_helper() {
        let listener = CollectingListener::new();
        deliver(&listener, &TranscriptionResult::Error("direct".to_string()));
        assert!(listener.events()[0].is_error());
    }
}

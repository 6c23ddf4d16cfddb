//! In-memory test doubles for the reporting and id-generation seams.

use std::sync::{Arc, Mutex};

use crate::trace::{SpanData, SpanReporter};

/// A [`SpanReporter`] that collects finished spans for assertions.
///
/// Clones share the same buffer, so a clone can be handed to a
/// [`Tracer`](crate::trace::Tracer) while the test keeps the original.
#[derive(Clone, Debug, Default)]
pub struct InMemoryReporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemoryReporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        InMemoryReporter::default()
    }

    /// Returns a snapshot of the spans reported so far.
    pub fn spans(&self) -> Vec<SpanData> {
        self.spans.lock().expect("reporter lock poisoned").clone()
    }

    /// Discards everything collected so far.
    pub fn clear(&self) {
        self.spans.lock().expect("reporter lock poisoned").clear();
    }
}

impl SpanReporter for InMemoryReporter {
    fn report(&self, span: SpanData) {
        self.spans.lock().expect("reporter lock poisoned").push(span);
    }
}

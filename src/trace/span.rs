use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use crate::trace::TraceContext;

/// A timed event recorded on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// What happened.
    pub name: Cow<'static, str>,
    /// When it happened.
    pub timestamp: SystemTime,
}

/// The immutable record of a finished span, handed to a [`SpanReporter`].
#[derive(Clone, Debug)]
pub struct SpanData {
    /// The span's identity within its trace.
    pub context: TraceContext,
    /// The operation name.
    pub name: Cow<'static, str>,
    /// When the operation started.
    pub start: SystemTime,
    /// When the operation ended.
    pub end: SystemTime,
    /// Key/value annotations, in recording order.
    pub tags: Vec<(Cow<'static, str>, String)>,
    /// Timed events, in recording order.
    pub events: Vec<Event>,
}

/// Receives finished spans.
///
/// This is the boundary to span backends and wire senders; the core calls it
/// synchronously from [`Span::end`] and expects it to be cheap. Reporters
/// that talk to the network should enqueue and return.
pub trait SpanReporter: Send + Sync + fmt::Debug {
    /// Accepts one finished span.
    fn report(&self, span: SpanData);
}

/// A reporter that discards everything.
#[derive(Clone, Debug, Default)]
pub struct NoopReporter {
    _private: (),
}

impl NoopReporter {
    /// Creates a new no-op reporter.
    pub fn new() -> Self {
        NoopReporter::default()
    }
}

impl SpanReporter for NoopReporter {
    fn report(&self, _span: SpanData) {}
}

/// One timed operation within a trace.
///
/// A `Span` is a cheap handle: clones share the same recording state, so a
/// span can be both held by application code and parked in the current
/// context at the same time. Spans for unsampled contexts carry no recording
/// state at all and every mutation is a no-op.
///
/// Ending is idempotent: the first [`end`](Span::end) reports the span,
/// later calls (including the one a [`ScopedSpan`] issues on drop) do
/// nothing.
///
/// [`ScopedSpan`]: crate::trace::ScopedSpan
#[derive(Clone, Debug)]
pub struct Span {
    context: TraceContext,
    inner: Option<Arc<SpanInner>>,
}

#[derive(Debug)]
struct SpanInner {
    recording: Mutex<Recording>,
    ended: AtomicBool,
    reporter: Arc<dyn SpanReporter>,
}

#[derive(Debug)]
struct Recording {
    name: Cow<'static, str>,
    start: SystemTime,
    tags: Vec<(Cow<'static, str>, String)>,
    events: Vec<Event>,
}

impl Span {
    pub(crate) fn start(
        context: TraceContext,
        name: impl Into<Cow<'static, str>>,
        reporter: Arc<dyn SpanReporter>,
    ) -> Self {
        let inner = if context.is_sampled() {
            Some(Arc::new(SpanInner {
                recording: Mutex::new(Recording {
                    name: name.into(),
                    start: SystemTime::now(),
                    tags: Vec::new(),
                    events: Vec::new(),
                }),
                ended: AtomicBool::new(false),
                reporter,
            }))
        } else {
            None
        };
        Span { context, inner }
    }

    /// A handle over a bare context, with no recording state.
    ///
    /// Used for contexts that became current without a span object (for
    /// example via scope passing of a propagated context).
    pub(crate) fn from_context(context: TraceContext) -> Self {
        Span {
            context,
            inner: None,
        }
    }

    /// The span's identity within its trace.
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    /// Whether mutations on this span are recorded.
    ///
    /// `false` for unsampled spans and for spans that already ended.
    pub fn is_recording(&self) -> bool {
        self.inner
            .as_ref()
            .map(|inner| !inner.ended.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Replaces the operation name.
    pub fn update_name(&self, name: impl Into<Cow<'static, str>>) {
        if let Some(mut recording) = self.recording() {
            recording.name = name.into();
        }
    }

    /// Records a key/value annotation.
    pub fn tag(&self, key: impl Into<Cow<'static, str>>, value: impl Into<String>) {
        if let Some(mut recording) = self.recording() {
            recording.tags.push((key.into(), value.into()));
        }
    }

    /// Records a timed event.
    pub fn event(&self, name: impl Into<Cow<'static, str>>) {
        self.event_with_timestamp(name, SystemTime::now());
    }

    /// Records an event that happened at `timestamp`.
    pub fn event_with_timestamp(&self, name: impl Into<Cow<'static, str>>, timestamp: SystemTime) {
        if let Some(mut recording) = self.recording() {
            recording.events.push(Event {
                name: name.into(),
                timestamp,
            });
        }
    }

    /// Records an error on the span.
    ///
    /// The error is annotated, never consumed or altered; callers keep
    /// propagating it as they see fit.
    pub fn error(&self, error: &dyn Error) {
        if let Some(mut recording) = self.recording() {
            recording.tags.push(("error".into(), error.to_string()));
            recording.events.push(Event {
                name: "error".into(),
                timestamp: SystemTime::now(),
            });
        }
    }

    /// Ends the span now.
    pub fn end(&self) {
        self.end_with_timestamp(SystemTime::now());
    }

    /// Ends the span at `timestamp`. Only the first end reports.
    pub fn end_with_timestamp(&self, timestamp: SystemTime) {
        let Some(inner) = &self.inner else {
            return;
        };
        if inner.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        let recording = match inner.recording.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.reporter.report(SpanData {
            context: self.context.clone(),
            name: recording.name.clone(),
            start: recording.start,
            end: timestamp,
            tags: recording.tags.clone(),
            events: recording.events.clone(),
        });
    }

    /// Lock the recording state, unless this span is a no-op or has ended.
    fn recording(&self) -> Option<MutexGuard<'_, Recording>> {
        let inner = self.inner.as_ref()?;
        if inner.ended.load(Ordering::Acquire) {
            return None;
        }
        match inner.recording.lock() {
            Ok(guard) => Some(guard),
            Err(poisoned) => Some(poisoned.into_inner()),
        }
    }
}

use std::borrow::Cow;
use std::error::Error;
use std::sync::Arc;

use crate::trace::{
    AlwaysSampler, CurrentTraceContext, IdGenerator, NoopReporter, RandomIdGenerator, Sampler,
    Scope, Span, SpanReporter, TraceContext,
};

/// The facade that mints spans and keeps track of the current one.
///
/// A `Tracer` combines the injected id-generation, sampling, and reporting
/// strategies with a [`CurrentTraceContext`] store. It creates root spans,
/// children of whatever is current, and continuations of contexts extracted
/// from a carrier, and it ties span lifetimes to scopes so that the store is
/// restored on every exit path.
///
/// Tracers are cheap to clone and safe to share across threads.
///
/// # Examples
///
/// ```
/// use tracescope::trace::Tracer;
///
/// let tracer = Tracer::builder().build();
///
/// let span = tracer.new_trace();
/// {
///     let _guard = tracer.with_span(Some(span.clone()));
///     // work under the span; children parent to it
///     let child = tracer.next_span();
///     assert_eq!(child.context().parent_id(), Some(span.context().span_id()));
/// }
/// span.end();
/// ```
#[derive(Clone, Debug)]
pub struct Tracer {
    current: CurrentTraceContext,
    id_generator: Arc<dyn IdGenerator>,
    sampler: Arc<dyn Sampler>,
    reporter: Arc<dyn SpanReporter>,
}

impl Tracer {
    /// Starts building a tracer; defaults are random ids, always-on
    /// sampling, and a reporter that discards everything.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// A tracer that never samples and reports nowhere.
    ///
    /// Used where tracing infrastructure is unavailable: instrumentation
    /// keeps working, producing no-op spans, and the traced application
    /// never observes a failure.
    pub fn disabled() -> Tracer {
        TracerBuilder::default()
            .with_sampler(crate::trace::NeverSampler::new())
            .build()
    }

    /// The current-context store this tracer works against.
    pub fn current_trace_context(&self) -> &CurrentTraceContext {
        &self.current
    }

    /// Starts a root span: fresh trace id, fresh span id, a sampling
    /// decision from the injected sampler.
    pub fn new_trace(&self) -> Span {
        let trace_id = self.id_generator.new_trace_id();
        let context = TraceContext::from_parts(
            trace_id,
            self.id_generator.new_span_id(),
            None,
            Some(self.sampler.should_sample(trace_id)),
            Vec::new().into(),
        );
        Span::start(context, "", Arc::clone(&self.reporter))
    }

    /// Starts a child of the current context, or a new root when nothing is
    /// current.
    pub fn next_span(&self) -> Span {
        match self.current.get() {
            Some(parent) => self.next_span_from(&parent),
            None => self.new_trace(),
        }
    }

    /// Starts a child of an extracted context.
    ///
    /// The trace id and baggage are carried over (the cells stay shared),
    /// the extracted span becomes the parent, and an undecided sampling flag
    /// is resolved by the sampler.
    pub fn next_span_from(&self, parent: &TraceContext) -> Span {
        let context = TraceContext::from_parts(
            parent.trace_id(),
            self.id_generator.new_span_id(),
            Some(parent.span_id()),
            Some(self.resolve_sampled(parent)),
            parent.extra_handle(),
        );
        Span::start(context, "", Arc::clone(&self.reporter))
    }

    /// Continues an extracted context as-is, reusing its span id instead of
    /// minting a child.
    ///
    /// This is for transport models where client and server share one span;
    /// an undecided sampling flag is resolved by the sampler.
    pub fn join_span(&self, extracted: &TraceContext) -> Span {
        let context = TraceContext::from_parts(
            extracted.trace_id(),
            extracted.span_id(),
            extracted.parent_id(),
            Some(self.resolve_sampled(extracted)),
            extracted.extra_handle(),
        );
        Span::start(context, "", Arc::clone(&self.reporter))
    }

    /// Returns the span currently active for this thread.
    ///
    /// When a context became current without a span object (scope passing of
    /// a propagated context), the returned handle carries that context but
    /// records nothing.
    pub fn current_span(&self) -> Option<Span> {
        if let Some(span) = self.current.current_span() {
            return Some(span);
        }
        self.current.get().map(Span::from_context)
    }

    /// Makes `span` current until the returned guard closes.
    ///
    /// Passing `None` explicitly clears the store: afterwards nothing is
    /// current, no matter how deeply scopes were nested. Closing the guard
    /// restores the state captured when it opened; closing the innermost
    /// guard restores what was active right before it opened even when an
    /// outer guard was closed out of order.
    #[must_use = "Dropping the guard immediately restores the previous span."]
    pub fn with_span(&self, span: Option<Span>) -> SpanInScope {
        let scope = match span {
            Some(span) => self.current.new_scope_with_span(span),
            None => self.current.new_scope(None),
        };
        SpanInScope { scope }
    }

    /// Starts a child span named `name` and makes it current.
    ///
    /// The span ends and the scope closes when the returned handle drops,
    /// also on panic and early return.
    pub fn start_scoped_span(&self, name: impl Into<Cow<'static, str>>) -> ScopedSpan {
        let span = self.next_span();
        span.update_name(name);
        let scope = self.current.new_scope_with_span(span.clone());
        ScopedSpan { span, scope }
    }

    /// Runs `f` under a new scoped span named `name`.
    pub fn in_span<N, F, T>(&self, name: N, f: F) -> T
    where
        N: Into<Cow<'static, str>>,
        F: FnOnce(&Span) -> T,
    {
        let scoped = self.start_scoped_span(name);
        f(scoped.span())
    }

    /// Runs `f` under a new scoped span named `name`, recording an `Err`
    /// outcome on the span.
    ///
    /// The error is returned unchanged; tracing observes failures, it never
    /// swallows them.
    pub fn in_span_result<N, F, T, E>(&self, name: N, f: F) -> Result<T, E>
    where
        N: Into<Cow<'static, str>>,
        F: FnOnce(&Span) -> Result<T, E>,
        E: Error,
    {
        let scoped = self.start_scoped_span(name);
        let result = f(scoped.span());
        if let Err(error) = &result {
            scoped.span().error(error);
        }
        result
    }

    fn resolve_sampled(&self, context: &TraceContext) -> bool {
        context
            .sampled()
            .unwrap_or_else(|| self.sampler.should_sample(context.trace_id()))
    }
}

/// Builder for [`Tracer`].
#[derive(Debug)]
pub struct TracerBuilder {
    current: CurrentTraceContext,
    id_generator: Arc<dyn IdGenerator>,
    sampler: Arc<dyn Sampler>,
    reporter: Arc<dyn SpanReporter>,
}

impl Default for TracerBuilder {
    fn default() -> Self {
        TracerBuilder {
            current: CurrentTraceContext::new(),
            id_generator: Arc::new(RandomIdGenerator::new()),
            sampler: Arc::new(AlwaysSampler::new()),
            reporter: Arc::new(NoopReporter::new()),
        }
    }
}

impl TracerBuilder {
    /// Uses the given current-context store (for decorators, or to share a
    /// store between tracers).
    pub fn with_current_trace_context(mut self, current: CurrentTraceContext) -> Self {
        self.current = current;
        self
    }

    /// Replaces the id generation strategy.
    pub fn with_id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Arc::new(id_generator);
        self
    }

    /// Replaces the sampling strategy.
    pub fn with_sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Arc::new(sampler);
        self
    }

    /// Replaces the span reporter.
    pub fn with_reporter(mut self, reporter: impl SpanReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Builds the tracer.
    pub fn build(self) -> Tracer {
        Tracer {
            current: self.current,
            id_generator: self.id_generator,
            sampler: self.sampler,
            reporter: self.reporter,
        }
    }
}

/// Guard returned by [`Tracer::with_span`]; closing restores the previously
/// current span.
#[must_use = "Dropping the guard immediately restores the previous span."]
#[derive(Debug)]
pub struct SpanInScope {
    scope: Scope,
}

impl SpanInScope {
    /// Closes the scope, restoring the previous state.
    pub fn close(self) {
        self.scope.close();
    }
}

/// A span that is also the current one, ended and detached in one step.
///
/// Returned by [`Tracer::start_scoped_span`]. Dropping the handle ends the
/// span and closes its scope; [`end`](ScopedSpan::end) is the explicit
/// spelling.
#[must_use = "Dropping the scoped span immediately ends it."]
#[derive(Debug)]
pub struct ScopedSpan {
    span: Span,
    scope: Scope,
}

impl ScopedSpan {
    /// The underlying span handle.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// The span's identity within its trace.
    pub fn context(&self) -> &TraceContext {
        self.span.context()
    }

    /// Records a key/value annotation.
    pub fn tag(&self, key: impl Into<Cow<'static, str>>, value: impl Into<String>) {
        self.span.tag(key, value);
    }

    /// Records a timed event.
    pub fn event(&self, name: impl Into<Cow<'static, str>>) {
        self.span.event(name);
    }

    /// Records an error on the span.
    pub fn error(&self, error: &dyn Error) {
        self.span.error(error);
    }

    /// Ends the span and closes its scope.
    pub fn end(self) {
        drop(self);
    }
}

impl Drop for ScopedSpan {
    fn drop(&mut self) {
        self.span.end();
        // The scope field closes right after, restoring the previous state.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryReporter;
    use crate::trace::{IncrementIdGenerator, NeverSampler, SpanId, TraceContextBuilder, TraceId};

    fn test_tracer(reporter: &InMemoryReporter) -> Tracer {
        Tracer::builder()
            .with_id_generator(IncrementIdGenerator::new())
            .with_reporter(reporter.clone())
            .build()
    }

    #[test]
    fn new_trace_starts_a_sampled_root() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        let span = tracer.new_trace();
        assert_eq!(span.context().trace_id(), TraceId::from(1u128));
        assert_eq!(span.context().span_id(), SpanId::from(2u64));
        assert_eq!(span.context().parent_id(), None);
        assert!(span.context().is_sampled());
    }

    #[test]
    fn next_span_parents_to_the_current_context() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        let root = tracer.new_trace();
        let guard = tracer.with_span(Some(root.clone()));
        let child = tracer.next_span();
        guard.close();

        assert_eq!(child.context().trace_id(), root.context().trace_id());
        assert_eq!(
            child.context().parent_id(),
            Some(root.context().span_id())
        );
        assert_ne!(child.context().span_id(), root.context().span_id());
    }

    #[test]
    fn next_span_without_current_starts_a_root() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        let span = tracer.next_span();
        assert_eq!(span.context().parent_id(), None);
    }

    #[test]
    fn next_span_from_resolves_deferred_sampling() {
        let reporter = InMemoryReporter::new();
        let tracer = Tracer::builder()
            .with_id_generator(IncrementIdGenerator::new())
            .with_sampler(NeverSampler::new())
            .with_reporter(reporter.clone())
            .build();

        let extracted = TraceContextBuilder::default()
            .trace_id(TraceId::from(0xabcu128))
            .span_id(SpanId::from(0xdefu64))
            .sampled(None)
            .build()
            .unwrap();

        let span = tracer.next_span_from(&extracted);
        assert_eq!(span.context().sampled(), Some(false));
        assert!(!span.is_recording());

        span.end();
        assert!(reporter.spans().is_empty());
    }

    #[test]
    fn join_span_reuses_the_extracted_ids() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        let extracted = TraceContextBuilder::default()
            .trace_id(TraceId::from(0xabcu128))
            .span_id(SpanId::from(0xdefu64))
            .parent_id(SpanId::from(0x123u64))
            .sampled(true)
            .build()
            .unwrap();

        let span = tracer.join_span(&extracted);
        assert_eq!(span.context().trace_id(), extracted.trace_id());
        assert_eq!(span.context().span_id(), extracted.span_id());
        assert_eq!(span.context().parent_id(), extracted.parent_id());
    }

    #[test]
    fn with_span_makes_the_span_current() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        assert!(tracer.current_span().is_none());

        let span = tracer.new_trace();
        let guard = tracer.with_span(Some(span.clone()));
        let current = tracer.current_span().unwrap();
        assert_eq!(current.context(), span.context());
        assert!(current.is_recording());

        guard.close();
        assert!(tracer.current_span().is_none());
    }

    #[test]
    fn with_none_clears_nested_spans_completely() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        let outer = tracer.with_span(Some(tracer.new_trace()));
        let inner = tracer.with_span(Some(tracer.new_trace()));

        let cleared = tracer.with_span(None);
        assert!(tracer.current_span().is_none());
        cleared.close();
        assert!(tracer.current_span().is_none());

        inner.close();
        outer.close();
        assert!(tracer.current_span().is_none());
    }

    #[test]
    fn current_span_from_bare_context_records_nothing() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        let context = TraceContextBuilder::default()
            .trace_id(TraceId::from(5u128))
            .span_id(SpanId::from(6u64))
            .sampled(true)
            .build()
            .unwrap();

        let scope = tracer
            .current_trace_context()
            .new_scope(Some(context.clone()));
        let span = tracer.current_span().unwrap();
        assert_eq!(span.context(), &context);
        assert!(!span.is_recording());
        scope.close();
    }

    #[test]
    fn scoped_span_reports_and_restores_on_end() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        let scoped = tracer.start_scoped_span("fetch");
        scoped.tag("peer.service", "backend");
        assert!(tracer.current_span().is_some());
        scoped.end();

        assert!(tracer.current_span().is_none());
        let spans = reporter.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "fetch");
    }

    #[test]
    fn in_span_nests_parents_naturally() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        tracer.in_span("outer", |outer| {
            let outer_id = outer.context().span_id();
            tracer.in_span("inner", |inner| {
                assert_eq!(inner.context().parent_id(), Some(outer_id));
            });
        });

        let names: Vec<_> = reporter.spans().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["inner", "outer"]);
    }

    #[test]
    fn in_span_result_records_the_error_and_returns_it() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        let result: Result<(), std::io::Error> = tracer.in_span_result("flaky", |_span| {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        });

        assert_eq!(result.unwrap_err().to_string(), "boom");
        let spans = reporter.spans();
        assert_eq!(spans[0].tags[0], ("error".into(), "boom".to_string()));
    }

    #[test]
    fn in_span_closes_the_scope_on_panic() {
        let reporter = InMemoryReporter::new();
        let tracer = test_tracer(&reporter);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tracer.in_span("doomed", |_span| panic!("kaboom"));
        }));

        assert!(result.is_err());
        assert!(tracer.current_span().is_none());
        // the span still ended and reported on unwind
        assert_eq!(reporter.spans().len(), 1);
    }

    #[test]
    fn disabled_tracer_produces_noop_spans() {
        let tracer = Tracer::disabled();
        let span = tracer.new_trace();
        assert!(!span.is_recording());
        span.end();
    }
}

//! Trace extensions for the [`Context`] carrier.

use crate::trace::{Span, TraceContext};
use crate::Context;

/// Methods for storing and retrieving trace data in a [`Context`].
///
/// A carrier travels with a unit of work (most prominently with an
/// asynchronous pipeline from its subscription site), so parking a span or a
/// bare context in it is how trace identity survives thread hops that
/// thread-locals cannot follow.
pub trait TraceContextExt {
    /// Returns a copy of this context with the trace context included.
    ///
    /// This is useful for building propagators and for pipelines that carry
    /// an extracted context without a local span object.
    fn with_trace_context(&self, trace_context: TraceContext) -> Self;

    /// Returns the carried trace context, if any.
    fn trace_context(&self) -> Option<&TraceContext>;

    /// Returns a copy of this context with the span (and its trace context)
    /// included.
    fn with_span(&self, span: Span) -> Self;

    /// Returns the carried span, if any.
    fn span(&self) -> Option<&Span>;
}

impl TraceContextExt for Context {
    fn with_trace_context(&self, trace_context: TraceContext) -> Self {
        self.with_value(trace_context)
    }

    fn trace_context(&self) -> Option<&TraceContext> {
        self.get::<TraceContext>()
    }

    fn with_span(&self, span: Span) -> Self {
        self.with_value(span.context().clone()).with_value(span)
    }

    fn span(&self) -> Option<&Span> {
        self.get::<Span>()
    }
}

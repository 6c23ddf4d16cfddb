//! The span lifecycle core: trace identifiers, the current-context store,
//! and the tracer facade.
//!
//! A [`TraceContext`] is the immutable identity of one span within a trace.
//! The [`CurrentTraceContext`] store says which context is active for the
//! calling thread right now, and hands out [`Scope`] guards that restore the
//! previous state when they close. The [`Tracer`] facade sits on top: it
//! mints root and child spans, continues extracted contexts, and ties span
//! lifetimes to scopes.
//!
//! ```
//! use tracescope::trace::Tracer;
//!
//! let tracer = Tracer::builder().build();
//!
//! tracer.in_span("resolve", |span| {
//!     // The span is current here; children started on this thread will
//!     // parent to it.
//!     assert_eq!(tracer.current_span().map(|s| s.context().clone()),
//!                Some(span.context().clone()));
//! });
//!
//! // Scope and span closed on exit, nothing is current anymore.
//! assert!(tracer.current_span().is_none());
//! ```

use thiserror::Error;

mod baggage;
mod context;
mod current;
mod id_generator;
mod sampler;
mod span;
mod trace_context;
mod tracer;

pub use self::{
    baggage::BaggageField,
    context::TraceContextExt,
    current::{CurrentTraceContext, CurrentTraceContextBuilder, Scope, ScopeDecorator},
    id_generator::{IdGenerator, RandomIdGenerator},
    sampler::{AlwaysSampler, NeverSampler, Sampler, TraceIdRatioSampler},
    span::{Event, NoopReporter, Span, SpanData, SpanReporter},
    trace_context::{SpanId, TraceContext, TraceContextBuilder, TraceId},
    tracer::{ScopedSpan, SpanInScope, Tracer, TracerBuilder},
};

#[cfg(any(feature = "testing", test))]
pub use self::id_generator::IncrementIdGenerator;

/// Describe the result of operations in the tracing API.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by the tracing API.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// An identifier string was not usable hex.
    #[error("{what} is not a valid hex identifier: {value:?}")]
    MalformedId {
        /// Which identifier was being parsed.
        what: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A required identifier was absent or all-zero.
    #[error("{0} is missing or zero")]
    MissingId(&'static str),

    /// A propagation header was present but did not follow the wire format.
    #[error("malformed {format} header: {value:?}")]
    MalformedHeader {
        /// The wire format being decoded.
        format: &'static str,
        /// The rejected header value.
        value: String,
    },

    /// No publisher was supplied where one is required.
    ///
    /// Passing nothing to the decoration decision indicates a programming
    /// mistake upstream and is never silently skipped.
    #[error("source publisher is missing")]
    MissingPublisher,

    /// Other errors not covered above.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(Box::new(Custom(err_msg)))
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

/// Wrap type for string
#[derive(Error, Debug)]
#[error("{0}")]
struct Custom(String);

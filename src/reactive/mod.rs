//! Scope passing for asynchronous pipelines.
//!
//! A future built while some context was current may be polled much later,
//! on a thread that has never seen that context. This module closes the
//! gap in two steps:
//!
//! - [`should_decorate`] analyzes a publisher at assembly time and proves,
//!   where it can, that wrapping is unnecessary: scalar and synchronous
//!   sources deliver in the subscribing call stack, so decorating every
//!   stage of a long chain would be pure overhead.
//! - [`ScopePassing`] wraps everything else, capturing the parent context at
//!   subscription time (from the [`Context`](crate::Context) carrier first,
//!   falling back to the thread-local store) and re-establishing it around
//!   each poll.
//!
//! [`schedule_hook`] covers the remaining surface: plain tasks handed to an
//! executor, which carry the context current at scheduling time.
//!
//! ```
//! use tracescope::reactive::ScopePassingExt;
//! use tracescope::trace::{CurrentTraceContext, SpanId, TraceContext, TraceId};
//!
//! let current = CurrentTraceContext::new();
//! let context = TraceContext::builder()
//!     .trace_id(TraceId::from(1u128))
//!     .span_id(SpanId::from(2u64))
//!     .build()
//!     .unwrap();
//!
//! let pipeline = {
//!     let current = current.clone();
//!     async move { current.get().map(|c| c.span_id()) }
//! };
//!
//! // Polls observe `context` no matter which thread runs them.
//! let wrapped = pipeline.pass_scope_with(context, &current);
//! assert_eq!(
//!     futures_executor::block_on(wrapped),
//!     Some(SpanId::from(2u64))
//! );
//! ```

mod scannable;
mod scope_passing;

pub use scannable::{should_decorate, RunStyle, Scannable};
pub use scope_passing::{
    schedule_hook, scope_passing_operator, MaybeDecorated, ScopePassing, ScopePassingExt,
};

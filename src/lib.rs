//! Tracescope keeps a distributed-tracing context attached to the code that
//! is actually running, whether that code is a plain function call, a task
//! handed to a thread pool, or a future being polled on whatever worker
//! thread the runtime picked this time.
//!
//! The crate is an in-process propagation core: it owns no threads, speaks no
//! wire protocol, and exports nothing itself. Span backends plug in behind
//! the [`trace::SpanReporter`], [`trace::Sampler`] and [`trace::IdGenerator`]
//! seams.
//!
//! ## Synchronous code
//!
//! The active [`trace::TraceContext`] for a thread lives in a
//! [`trace::CurrentTraceContext`] store. Making a context current returns a
//! [`trace::Scope`] guard; dropping the guard restores what was current
//! before, on every exit path.
//!
//! ```
//! use tracescope::trace::{CurrentTraceContext, SpanId, TraceContext, TraceId};
//!
//! let current = CurrentTraceContext::new();
//! let context = TraceContext::builder()
//!     .trace_id(TraceId::from(1u128))
//!     .span_id(SpanId::from(2u64))
//!     .sampled(true)
//!     .build()
//!     .unwrap();
//!
//! {
//!     let _scope = current.new_scope(Some(context.clone()));
//!     assert_eq!(current.get(), Some(context));
//! }
//!
//! // The scope has been dropped, nothing is current anymore.
//! assert_eq!(current.get(), None);
//! ```
//!
//! ## Asynchronous code
//!
//! Thread identity means nothing to a future, so the thread-local store alone
//! cannot follow one across polls. The [`reactive`] module wraps futures and
//! streams so that the context captured at subscription time is made current
//! around every poll, and restored afterwards, no matter which thread runs
//! the poll. [`reactive::should_decorate`] skips the wrapping for sources
//! that can never leave the subscribing thread.
//!
//! ## Spans
//!
//! [`trace::Tracer`] is the facade that mints spans, keeps track of the
//! current one, and guarantees that scopes close in the face of early
//! returns and panics.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![allow(clippy::needless_doctest_main)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]

mod context;

pub use context::Context;

pub mod global;

pub mod propagation;

#[cfg(feature = "reactive")]
#[cfg_attr(docsrs, doc(cfg(feature = "reactive")))]
pub mod reactive;

pub mod trace;

#[cfg(any(feature = "testing", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

mod internal_logging;

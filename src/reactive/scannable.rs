use crate::trace::{TraceContext, TraceError, TraceResult};

/// How a publisher delivers its signals relative to the subscribing thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStyle {
    /// Signals are delivered synchronously on the subscribing thread.
    Sync,
    /// Signals may be delivered later, possibly from other threads.
    Async,
    /// Nothing is known; treated like [`Async`](RunStyle::Async).
    Unknown,
}

/// Assembly-time metadata a publisher exposes about itself.
///
/// The defaults describe a publisher nothing is known about, which is
/// always decorated. Known-synchronous sources and combinators override the
/// relevant methods so [`should_decorate`] can prove the wrapping
/// unnecessary; a wrong claim of synchrony loses context propagation, so
/// only override what the type actually guarantees.
pub trait Scannable {
    /// The publisher's execution style.
    fn run_style(&self) -> RunStyle {
        RunStyle::Unknown
    }

    /// Whether this is an already-resolved constant source. Scalar sources
    /// deliver in the subscribing call stack and can never observe a stale
    /// context.
    fn is_scalar(&self) -> bool {
        false
    }

    /// Whether this is an origin producer (a publisher without an upstream)
    /// whose execution style is authoritative.
    fn is_source(&self) -> bool {
        false
    }

    /// The context this publisher already passes along, when it is itself a
    /// scope-passing wrapper. Used to keep the decoration idempotent.
    fn passed_parent(&self) -> Option<&TraceContext> {
        None
    }

    /// The upstream stage this publisher consumes, if it exposes one.
    fn source(&self) -> Option<&dyn Scannable> {
        None
    }
}

/// Decides whether a publisher needs a scope-passing decorator.
///
/// Decorating is only useful when a signal can be delivered outside the
/// subscribing call stack; for everything provably synchronous the ambient
/// context at subscribe time is still correct at signal time, and wrapping
/// is pure overhead, linear in chain length for long pipelines. The rules:
///
/// - a scalar (already-resolved) source is never decorated;
/// - a publisher that already passes scope is never decorated again;
/// - a non-synchronous or unknown publisher is always decorated;
/// - a synchronous stage defers to its upstream: a chain that bottoms out
///   in a synchronous origin needs no decoration, a chain that ends in an
///   unknown origin is decorated to stay correct.
///
/// Passing `None` is a programming mistake upstream and is rejected with
/// [`TraceError::MissingPublisher`], never treated as "skip".
pub fn should_decorate(publisher: Option<&dyn Scannable>) -> TraceResult<bool> {
    let mut current = Some(publisher.ok_or(TraceError::MissingPublisher)?);
    loop {
        let publisher = match current {
            // Start of the chain without a verdict: a foreign or unknown
            // origin may signal from anywhere.
            None => return Ok(true),
            Some(publisher) => publisher,
        };
        if publisher.is_scalar() {
            return Ok(false);
        }
        if publisher.passed_parent().is_some() {
            return Ok(false);
        }
        if publisher.run_style() != RunStyle::Sync {
            return Ok(true);
        }
        if publisher.is_source() {
            return Ok(false);
        }
        current = publisher.source();
    }
}

impl<T> Scannable for futures_util::future::Ready<T> {
    fn run_style(&self) -> RunStyle {
        RunStyle::Sync
    }

    fn is_scalar(&self) -> bool {
        true
    }

    fn is_source(&self) -> bool {
        true
    }
}

impl<T> Scannable for futures_util::future::Pending<T> {
    fn run_style(&self) -> RunStyle {
        RunStyle::Sync
    }

    fn is_source(&self) -> bool {
        true
    }
}

impl<I> Scannable for futures_util::stream::Iter<I> {
    fn run_style(&self) -> RunStyle {
        RunStyle::Sync
    }

    fn is_source(&self) -> bool {
        true
    }
}

impl<T> Scannable for futures_util::stream::Empty<T> {
    fn run_style(&self) -> RunStyle {
        RunStyle::Sync
    }

    fn is_scalar(&self) -> bool {
        true
    }

    fn is_source(&self) -> bool {
        true
    }
}

impl<T> Scannable for futures_util::stream::Pending<T> {
    fn run_style(&self) -> RunStyle {
        RunStyle::Sync
    }

    fn is_source(&self) -> bool {
        true
    }
}

impl<T: Clone> Scannable for futures_util::stream::Repeat<T> {
    fn run_style(&self) -> RunStyle {
        RunStyle::Sync
    }

    fn is_source(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanId, TraceId};
    use futures_util::{future, stream};

    struct AsyncSource;

    impl Scannable for AsyncSource {
        fn run_style(&self) -> RunStyle {
            RunStyle::Async
        }

        fn is_source(&self) -> bool {
            true
        }
    }

    struct SyncSource;

    impl Scannable for SyncSource {
        fn run_style(&self) -> RunStyle {
            RunStyle::Sync
        }

        fn is_source(&self) -> bool {
            true
        }
    }

    /// A synchronous combinator stage over some upstream.
    struct SyncStage<S>(S);

    impl<S: Scannable> Scannable for SyncStage<S> {
        fn run_style(&self) -> RunStyle {
            RunStyle::Sync
        }

        fn source(&self) -> Option<&dyn Scannable> {
            Some(&self.0)
        }
    }

    struct OpaqueSource;

    impl Scannable for OpaqueSource {}

    struct Tagged(TraceContext);

    impl Scannable for Tagged {
        fn run_style(&self) -> RunStyle {
            RunStyle::Async
        }

        fn passed_parent(&self) -> Option<&TraceContext> {
            Some(&self.0)
        }
    }

    fn context() -> TraceContext {
        TraceContext::builder()
            .trace_id(TraceId::from(1u128))
            .span_id(SpanId::from(2u64))
            .build()
            .unwrap()
    }

    #[test]
    fn scalar_sources_are_not_decorated() {
        assert!(!should_decorate(Some(&future::ready(1))).unwrap());
        assert!(!should_decorate(Some(&stream::empty::<u32>())).unwrap());
    }

    #[test]
    fn synchronous_sources_are_not_decorated() {
        assert!(!should_decorate(Some(&stream::iter(0..4))).unwrap());
        assert!(!should_decorate(Some(&stream::repeat(1))).unwrap());
        assert!(!should_decorate(Some(&SyncSource)).unwrap());
    }

    #[test]
    fn asynchronous_and_unknown_sources_are_decorated() {
        assert!(should_decorate(Some(&AsyncSource)).unwrap());
        assert!(should_decorate(Some(&OpaqueSource)).unwrap());
    }

    #[test]
    fn already_tagged_publishers_are_not_decorated_again() {
        assert!(!should_decorate(Some(&Tagged(context()))).unwrap());
    }

    #[test]
    fn missing_publisher_is_rejected() {
        assert!(matches!(
            should_decorate(None),
            Err(TraceError::MissingPublisher)
        ));
    }

    #[test]
    fn synchronous_stages_defer_to_their_origin() {
        // sync all the way down to a sync origin: skip
        assert!(!should_decorate(Some(&SyncStage(SyncStage(SyncSource)))).unwrap());
        // sync stages over an async origin: decorate
        assert!(should_decorate(Some(&SyncStage(AsyncSource))).unwrap());
        // sync stage over an already-passing chain: skip
        assert!(!should_decorate(Some(&SyncStage(Tagged(context())))).unwrap());
    }

    #[test]
    fn sync_stage_without_a_known_origin_is_decorated() {
        struct RootlessSyncStage;
        impl Scannable for RootlessSyncStage {
            fn run_style(&self) -> RunStyle {
                RunStyle::Sync
            }
        }
        assert!(should_decorate(Some(&RootlessSyncStage)).unwrap());
    }
}

use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use futures_core::Stream;
use pin_project::pin_project;

use crate::internal_logging::ts_debug;
use crate::reactive::{should_decorate, RunStyle, Scannable};
use crate::trace::{CurrentTraceContext, TraceContext, TraceContextExt, TraceResult};
use crate::Context;

/// A future or stream that re-establishes a captured [`TraceContext`]
/// around every poll.
///
/// The parent context is captured once, at construction (subscription)
/// time. Each poll opens `maybe_scope(parent)` on the store, runs the inner
/// poll, and closes the scope on the same call stack: the context is
/// current exactly for the duration of the signal, on whichever thread the
/// runtime chose, and whatever was current on that thread before is
/// restored afterwards. `maybe_scope` keeps the non-hopping case free: when
/// the thread already has the parent current, no store write happens.
///
/// Termination is absorbing. Once a future resolves or a stream finishes,
/// no further scope is opened: the wrapper is fused, a finished stream keeps
/// answering `Ready(None)` and a resolved future `Pending`. Dropping the
/// wrapper (cancellation) cannot leak a scope, because scopes only live
/// inside `poll`.
#[pin_project]
#[derive(Debug)]
pub struct ScopePassing<T> {
    #[pin]
    inner: T,
    parent: TraceContext,
    current: CurrentTraceContext,
    terminated: bool,
}

impl<T> ScopePassing<T> {
    /// Wraps `inner`, re-establishing `parent` around every poll.
    pub fn new(inner: T, parent: TraceContext, current: CurrentTraceContext) -> Self {
        ScopePassing {
            inner,
            parent,
            current,
            terminated: false,
        }
    }

    /// The context this wrapper passes along.
    pub fn parent(&self) -> &TraceContext {
        &self.parent
    }

    /// Unwraps the inner future or stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Future> Future for ScopePassing<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        if *this.terminated {
            return Poll::Pending;
        }
        let polled = {
            let _scope = this.current.maybe_scope(Some(this.parent.clone()));
            this.inner.poll(task_cx)
        };
        if polled.is_ready() {
            *this.terminated = true;
        }
        polled
    }
}

impl<T: Stream> Stream for ScopePassing<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.terminated {
            return Poll::Ready(None);
        }
        let polled = {
            let _scope = this.current.maybe_scope(Some(this.parent.clone()));
            this.inner.poll_next(task_cx)
        };
        if matches!(polled, Poll::Ready(None)) {
            *this.terminated = true;
        }
        polled
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.terminated {
            (0, Some(0))
        } else {
            self.inner.size_hint()
        }
    }
}

impl<T: Scannable> Scannable for ScopePassing<T> {
    fn run_style(&self) -> RunStyle {
        self.inner.run_style()
    }

    fn passed_parent(&self) -> Option<&TraceContext> {
        Some(&self.parent)
    }

    fn source(&self) -> Option<&dyn Scannable> {
        Some(&self.inner)
    }
}

/// The outcome of [`scope_passing_operator`]: the publisher, decorated only
/// when that was necessary.
#[pin_project(project = MaybeDecoratedProj)]
#[derive(Debug)]
pub enum MaybeDecorated<P> {
    /// The publisher as it came in; decoration was provably unnecessary or
    /// there was no context to pass.
    Passthrough(#[pin] P),
    /// The publisher behind a scope-passing wrapper.
    Decorated(#[pin] ScopePassing<P>),
}

impl<P> MaybeDecorated<P> {
    /// Whether the publisher ended up decorated.
    pub fn is_decorated(&self) -> bool {
        matches!(self, MaybeDecorated::Decorated(_))
    }
}

impl<P: Future> Future for MaybeDecorated<P> {
    type Output = P::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match self.project() {
            MaybeDecoratedProj::Passthrough(inner) => inner.poll(task_cx),
            MaybeDecoratedProj::Decorated(inner) => inner.poll(task_cx),
        }
    }
}

impl<P: Stream> Stream for MaybeDecorated<P> {
    type Item = P::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        match self.project() {
            MaybeDecoratedProj::Passthrough(inner) => inner.poll_next(task_cx),
            MaybeDecoratedProj::Decorated(inner) => inner.poll_next(task_cx),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            MaybeDecorated::Passthrough(inner) => inner.size_hint(),
            MaybeDecorated::Decorated(inner) => inner.size_hint(),
        }
    }
}

impl<P: Scannable> Scannable for MaybeDecorated<P> {
    fn run_style(&self) -> RunStyle {
        match self {
            MaybeDecorated::Passthrough(inner) => inner.run_style(),
            MaybeDecorated::Decorated(inner) => inner.run_style(),
        }
    }

    fn is_scalar(&self) -> bool {
        match self {
            MaybeDecorated::Passthrough(inner) => inner.is_scalar(),
            MaybeDecorated::Decorated(_) => false,
        }
    }

    fn is_source(&self) -> bool {
        match self {
            MaybeDecorated::Passthrough(inner) => inner.is_source(),
            MaybeDecorated::Decorated(_) => false,
        }
    }

    fn passed_parent(&self) -> Option<&TraceContext> {
        match self {
            MaybeDecorated::Passthrough(inner) => inner.passed_parent(),
            MaybeDecorated::Decorated(inner) => inner.passed_parent(),
        }
    }

    fn source(&self) -> Option<&dyn Scannable> {
        match self {
            MaybeDecorated::Passthrough(inner) => inner.source(),
            MaybeDecorated::Decorated(inner) => inner.source(),
        }
    }
}

/// Decorates `publisher` with scope passing only when that is needed.
///
/// [`should_decorate`] rules out publishers that provably cannot observe a
/// stale context. For the rest, the parent is captured from the
/// subscription-site carrier: an explicit [`TraceContext`] entry wins, then
/// a carried [`Span`](crate::trace::Span)'s context, then the ambient
/// thread-local current context. With no parent anywhere there is nothing
/// to pass and the publisher is returned untouched.
pub fn scope_passing_operator<P: Scannable>(
    publisher: P,
    subscribe_cx: &Context,
    current: &CurrentTraceContext,
) -> TraceResult<MaybeDecorated<P>> {
    if !should_decorate(Some(&publisher as &dyn Scannable))? {
        return Ok(MaybeDecorated::Passthrough(publisher));
    }
    match capture_parent(subscribe_cx, current) {
        Some(parent) => Ok(MaybeDecorated::Decorated(ScopePassing::new(
            publisher,
            parent,
            current.clone(),
        ))),
        None => {
            // No need to scope a null parent.
            ts_debug!("no trace context at subscription, leaving publisher undecorated");
            Ok(MaybeDecorated::Passthrough(publisher))
        }
    }
}

/// Like [`CurrentTraceContext::get`], except it first checks the carrier.
fn capture_parent(cx: &Context, current: &CurrentTraceContext) -> Option<TraceContext> {
    if let Some(context) = cx.trace_context() {
        return Some(context.clone());
    }
    if let Some(span) = cx.span() {
        return Some(span.context().clone());
    }
    current.get()
}

/// Returns a hook that wraps scheduled tasks so their body observes the
/// context current at scheduling time.
///
/// Apply it where tasks are handed to an executor: a pool thread has no
/// ambient context, so each task carries its own. Tasks scheduled with no
/// context current run with none, also when the pool thread happens to have
/// one left over.
pub fn schedule_hook(
    current: &CurrentTraceContext,
) -> impl Fn(Box<dyn FnOnce() + Send>) -> Box<dyn FnOnce() + Send> {
    let store = current.clone();
    move |task| {
        let captured = store.get();
        let store = store.clone();
        Box::new(move || {
            let _scope = store.maybe_scope(captured);
            task();
        })
    }
}

/// Attaches scope passing to futures and streams, in the style of
/// combinator extension traits.
pub trait ScopePassingExt: Sized {
    /// Re-establishes `parent` around every poll of `self`.
    fn pass_scope_with(self, parent: TraceContext, current: &CurrentTraceContext) -> ScopePassing<Self> {
        ScopePassing::new(self, parent, current.clone())
    }

    /// Captures the caller's current context now and re-establishes it
    /// around every poll of `self`. With nothing current, `self` is
    /// returned undecorated.
    fn pass_current_scope(self, current: &CurrentTraceContext) -> MaybeDecorated<Self> {
        match current.get() {
            Some(parent) => {
                MaybeDecorated::Decorated(ScopePassing::new(self, parent, current.clone()))
            }
            None => MaybeDecorated::Passthrough(self),
        }
    }
}

impl<T: Sized> ScopePassingExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{ScopeDecorator, SpanId, TraceId};
    use futures_util::task::noop_waker;
    use futures_util::{future, stream, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn context(span_id: u64) -> TraceContext {
        TraceContext::builder()
            .trace_id(TraceId::from(0xabcu128))
            .span_id(SpanId::from(span_id))
            .build()
            .unwrap()
    }

    struct CountingDecorator(Arc<AtomicUsize>);

    impl ScopeDecorator for CountingDecorator {
        fn on_current(&self, _context: Option<&TraceContext>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct AsyncSource;

    impl Scannable for AsyncSource {
        fn run_style(&self) -> RunStyle {
            RunStyle::Async
        }

        fn is_source(&self) -> bool {
            true
        }
    }

    #[test]
    fn future_observes_the_captured_context_on_another_thread() {
        let current = CurrentTraceContext::new();
        let parent = context(1);

        let probe = {
            let current = current.clone();
            future::lazy(move |_| current.get())
        };
        let wrapped = ScopePassing::new(probe, parent.clone(), current.clone());

        let observed = std::thread::spawn(move || futures_executor::block_on(wrapped))
            .join()
            .unwrap();
        assert_eq!(observed, Some(parent));

        // The constructing thread is unaffected.
        assert_eq!(current.get(), None);
    }

    #[test]
    fn poll_restores_whatever_was_current_before() {
        let current = CurrentTraceContext::new();
        let pipeline_context = context(1);
        let thread_context = context(2);

        let probe = {
            let current = current.clone();
            future::lazy(move |_| current.get())
        };
        let mut wrapped = Box::pin(ScopePassing::new(
            probe,
            pipeline_context.clone(),
            current.clone(),
        ));

        let outer = current.new_scope(Some(thread_context.clone()));

        let waker = noop_waker();
        let mut task_cx = TaskContext::from_waker(&waker);
        match wrapped.as_mut().poll(&mut task_cx) {
            Poll::Ready(observed) => assert_eq!(observed, Some(pipeline_context)),
            Poll::Pending => panic!("lazy future should resolve on first poll"),
        }

        // After the signal the thread's own context is back.
        assert_eq!(current.get(), Some(thread_context));
        outer.close();
    }

    #[test]
    fn stream_opens_a_scope_per_item_and_fuses_after_the_end() {
        let current = CurrentTraceContext::new();
        let parent = context(1);

        let observed = {
            let current = current.clone();
            stream::iter(0..3).map(move |_| current.get())
        };
        let mut wrapped = Box::pin(ScopePassing::new(observed, parent.clone(), current.clone()));

        let items: Vec<_> =
            futures_executor::block_on(async { wrapped.as_mut().collect::<Vec<_>>().await });
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| item.as_ref() == Some(&parent)));

        // Exhausted: keeps answering None without touching the store.
        let waker = noop_waker();
        let mut task_cx = TaskContext::from_waker(&waker);
        assert!(matches!(
            wrapped.as_mut().poll_next(&mut task_cx),
            Poll::Ready(None)
        ));
        assert_eq!(current.get(), None);
    }

    #[test]
    fn no_scope_churn_when_the_context_is_already_current() {
        let notifications = Arc::new(AtomicUsize::new(0));
        let current = CurrentTraceContext::builder()
            .with_decorator(CountingDecorator(Arc::clone(&notifications)))
            .build();
        let parent = context(1);

        let mut wrapped = Box::pin(ScopePassing::new(
            future::ready(()),
            parent.clone(),
            current.clone(),
        ));

        let outer = current.new_scope(Some(parent));
        let attach_count = notifications.load(Ordering::SeqCst);

        let waker = noop_waker();
        let mut task_cx = TaskContext::from_waker(&waker);
        let _ = wrapped.as_mut().poll(&mut task_cx);

        // maybe_scope saw the same context and did nothing.
        assert_eq!(notifications.load(Ordering::SeqCst), attach_count);
        outer.close();
    }

    #[test]
    fn terminated_future_opens_no_further_scopes() {
        let notifications = Arc::new(AtomicUsize::new(0));
        let current = CurrentTraceContext::builder()
            .with_decorator(CountingDecorator(Arc::clone(&notifications)))
            .build();

        let mut wrapped = Box::pin(ScopePassing::new(
            future::ready(()),
            context(1),
            current.clone(),
        ));

        let waker = noop_waker();
        let mut task_cx = TaskContext::from_waker(&waker);
        let _ = wrapped.as_mut().poll(&mut task_cx);
        let after_completion = notifications.load(Ordering::SeqCst);
        assert!(after_completion > 0);

        // A misbehaving caller polling again gets no new scope.
        let _ = wrapped.as_mut().poll(&mut task_cx);
        assert_eq!(notifications.load(Ordering::SeqCst), after_completion);
    }

    #[test]
    fn dropping_mid_stream_leaves_the_store_clean() {
        let current = CurrentTraceContext::new();
        let wrapped = ScopePassing::new(
            stream::iter(0..100),
            context(1),
            current.clone(),
        );

        let mut wrapped = Box::pin(wrapped);
        futures_executor::block_on(async {
            let _first = wrapped.next().await;
        });
        drop(wrapped); // cancel with 99 items in flight

        assert_eq!(current.get(), None);
    }

    #[test]
    fn operator_skips_scalar_publishers() {
        let current = CurrentTraceContext::new();
        let scope = current.new_scope(Some(context(1)));

        let decorated =
            scope_passing_operator(future::ready(1), &Context::new(), &current).unwrap();
        assert!(!decorated.is_decorated());
        assert_eq!(futures_executor::block_on(decorated), 1);
        scope.close();
    }

    #[test]
    fn operator_prefers_the_carrier_context_over_the_thread_local() {
        let current = CurrentTraceContext::new();
        let carrier_context = context(7);
        let subscribe_cx = Context::new().with_trace_context(carrier_context.clone());

        let scope = current.new_scope(Some(context(8)));
        let decorated = scope_passing_operator(AsyncSource, &subscribe_cx, &current).unwrap();
        scope.close();

        match &decorated {
            MaybeDecorated::Decorated(wrapped) => {
                assert_eq!(wrapped.parent(), &carrier_context);
            }
            MaybeDecorated::Passthrough(_) => panic!("async source must be decorated"),
        }
    }

    #[test]
    fn operator_falls_back_to_the_ambient_context() {
        let current = CurrentTraceContext::new();
        let ambient = context(9);

        let scope = current.new_scope(Some(ambient.clone()));
        let decorated = scope_passing_operator(AsyncSource, &Context::new(), &current).unwrap();
        scope.close();

        assert!(decorated.is_decorated());
        assert_eq!(decorated.passed_parent(), Some(&ambient));
    }

    #[test]
    fn operator_without_any_context_passes_through() {
        let current = CurrentTraceContext::new();
        let decorated = scope_passing_operator(AsyncSource, &Context::new(), &current).unwrap();
        assert!(!decorated.is_decorated());
    }

    #[test]
    fn operator_never_wraps_twice() {
        let current = CurrentTraceContext::new();
        let subscribe_cx = Context::new().with_trace_context(context(1));

        let once = scope_passing_operator(AsyncSource, &subscribe_cx, &current).unwrap();
        assert!(once.is_decorated());

        let twice = scope_passing_operator(once, &subscribe_cx, &current).unwrap();
        assert!(!twice.is_decorated());
    }

    #[test]
    fn schedule_hook_carries_the_scheduling_context() {
        let current = CurrentTraceContext::new();
        let hook = schedule_hook(&current);
        let parent = context(1);

        let observed = Arc::new(Mutex::new(None));
        let scope = current.new_scope(Some(parent.clone()));
        let task = {
            let current = current.clone();
            let observed = Arc::clone(&observed);
            hook(Box::new(move || {
                *observed.lock().unwrap() = current.get();
            }))
        };
        scope.close();

        std::thread::spawn(task).join().unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(parent));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn context_survives_runtime_thread_hops() {
        let current = CurrentTraceContext::new();
        let parent = context(1);

        let pipeline = {
            let current = current.clone();
            let parent = parent.clone();
            async move {
                assert_eq!(current.get(), Some(parent.clone()));
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                assert_eq!(current.get(), Some(parent));
            }
        };

        let wrapped = pipeline.pass_scope_with(parent, &current);
        tokio::spawn(wrapped).await.unwrap();

        assert_eq!(current.get(), None);
    }
}

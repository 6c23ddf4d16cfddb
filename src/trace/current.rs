use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use crate::trace::{Span, TraceContext};

thread_local! {
    static CURRENT: RefCell<LocalState> = RefCell::new(LocalState::default());
}

#[derive(Default)]
struct LocalState {
    frame: Option<Frame>,
    /// Revocation flags for the revert scopes still open on this thread.
    /// A clearing scope flips them all so their later closes become no-ops.
    open: Vec<Rc<Cell<bool>>>,
}

/// What is current for a thread: the context, and the span it belongs to
/// when one was attached (contexts arriving via propagation have no span
/// object).
#[derive(Clone)]
struct Frame {
    context: TraceContext,
    span: Option<Span>,
}

/// Observer of transitions of the current context.
///
/// Decorators keep cross-cutting side channels (for example log-correlation
/// fields) in sync with the store: they are invoked on the same call stack
/// as the transition itself, for scope open, restore, and clear alike.
pub trait ScopeDecorator: Send + Sync {
    /// Called after the current context changed, with the now-current value.
    fn on_current(&self, context: Option<&TraceContext>);
}

/// Per-thread storage of the currently active [`TraceContext`].
///
/// The slot itself is thread-local and shared by every handle; handles carry
/// only their decorator configuration, so cloning one is cheap and clones
/// observe the same current context.
///
/// All operations are synchronous, non-blocking, and never fail. Passing
/// `None` where a context is accepted is meaningful input (it clears the
/// slot), not an error.
///
/// # Examples
///
/// ```
/// use tracescope::trace::{CurrentTraceContext, SpanId, TraceContext, TraceId};
///
/// let current = CurrentTraceContext::new();
/// let context = TraceContext::builder()
///     .trace_id(TraceId::from(1u128))
///     .span_id(SpanId::from(2u64))
///     .build()
///     .unwrap();
///
/// let scope = current.new_scope(Some(context.clone()));
/// assert_eq!(current.get(), Some(context));
/// scope.close();
/// assert_eq!(current.get(), None);
/// ```
#[derive(Clone, Default)]
pub struct CurrentTraceContext {
    decorators: Arc<[Arc<dyn ScopeDecorator>]>,
}

impl CurrentTraceContext {
    /// Creates a store handle with no decorators.
    pub fn new() -> Self {
        CurrentTraceContext::default()
    }

    /// Starts building a store handle with decorators.
    pub fn builder() -> CurrentTraceContextBuilder {
        CurrentTraceContextBuilder::default()
    }

    /// Returns the context active for the calling thread, if any.
    pub fn get(&self) -> Option<TraceContext> {
        CURRENT.with(|state| {
            state
                .borrow()
                .frame
                .as_ref()
                .map(|frame| frame.context.clone())
        })
    }

    /// Returns the span attached to the current frame, if one was.
    pub(crate) fn current_span(&self) -> Option<Span> {
        CURRENT.with(|state| {
            state
                .borrow()
                .frame
                .as_ref()
                .and_then(|frame| frame.span.clone())
        })
    }

    /// Makes `context` current and returns the scope that undoes it.
    ///
    /// With `Some`, closing the returned scope restores exactly the value
    /// that was active immediately before this call, also when scopes are
    /// closed out of order: each close still restores the value it
    /// captured.
    ///
    /// With `None` the slot is explicitly cleared: every scope still open on
    /// this thread is revoked (their closes become no-ops), and closing the
    /// returned scope keeps the slot cleared rather than restoring anything.
    #[must_use = "Dropping the scope immediately restores the previous context."]
    pub fn new_scope(&self, context: Option<TraceContext>) -> Scope {
        match context {
            Some(context) => self.attach(Frame {
                context,
                span: None,
            }),
            None => self.clear(),
        }
    }

    /// Like [`new_scope`], but a no-op when `context` already equals the
    /// current value.
    ///
    /// The scope returned for the no-op case does nothing on close, so
    /// re-entering the same logical context costs neither a store write nor
    /// decorator churn.
    ///
    /// [`new_scope`]: CurrentTraceContext::new_scope
    #[must_use = "Dropping the scope immediately restores the previous context."]
    pub fn maybe_scope(&self, context: Option<TraceContext>) -> Scope {
        let redundant = CURRENT.with(|state| {
            let state = state.borrow();
            match (&state.frame, &context) {
                (None, None) => true,
                (Some(frame), Some(context)) => frame.context == *context,
                _ => false,
            }
        });
        if redundant {
            Scope::noop()
        } else {
            self.new_scope(context)
        }
    }

    /// Wraps a task so that its body observes the context current at wrap
    /// time, wherever and whenever the task eventually runs.
    ///
    /// This is the hook to hand to executors and schedulers: a pool thread
    /// has no ambient context of its own, so the wrapper carries the one
    /// from the scheduling site and opens a scope around the body.
    pub fn wrap<F>(&self, task: F) -> impl FnOnce()
    where
        F: FnOnce(),
    {
        let store = self.clone();
        let captured = self.get();
        move || {
            let _scope = store.maybe_scope(captured);
            task();
        }
    }

    pub(crate) fn new_scope_with_span(&self, span: Span) -> Scope {
        let context = span.context().clone();
        self.attach(Frame {
            context,
            span: Some(span),
        })
    }

    fn attach(&self, frame: Frame) -> Scope {
        let revoked = Rc::new(Cell::new(false));
        let attached = frame.context.clone();
        let prev = CURRENT.with(|state| {
            let mut state = state.borrow_mut();
            state.open.push(Rc::clone(&revoked));
            state.frame.replace(frame)
        });
        self.notify(Some(&attached));
        Scope {
            inner: ScopeInner::Revert {
                prev,
                revoked,
                decorators: Arc::clone(&self.decorators),
            },
            _not_send: PhantomData,
        }
    }

    fn clear(&self) -> Scope {
        CURRENT.with(|state| {
            let mut state = state.borrow_mut();
            for flag in state.open.drain(..) {
                flag.set(true);
            }
            state.frame = None;
        });
        self.notify(None);
        Scope {
            inner: ScopeInner::Clear,
            _not_send: PhantomData,
        }
    }

    fn notify(&self, current: Option<&TraceContext>) {
        for decorator in self.decorators.iter() {
            decorator.on_current(current);
        }
    }
}

impl fmt::Debug for CurrentTraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentTraceContext")
            .field("decorators", &self.decorators.len())
            .finish()
    }
}

/// Builder for a [`CurrentTraceContext`] with scope decorators.
#[derive(Default)]
pub struct CurrentTraceContextBuilder {
    decorators: Vec<Arc<dyn ScopeDecorator>>,
}

impl CurrentTraceContextBuilder {
    /// Registers a decorator, notified on every transition of the current
    /// context in registration order.
    pub fn with_decorator(mut self, decorator: impl ScopeDecorator + 'static) -> Self {
        self.decorators.push(Arc::new(decorator));
        self
    }

    /// Builds the store handle.
    pub fn build(self) -> CurrentTraceContext {
        CurrentTraceContext {
            decorators: self.decorators.into(),
        }
    }
}

impl fmt::Debug for CurrentTraceContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentTraceContextBuilder")
            .field("decorators", &self.decorators.len())
            .finish()
    }
}

/// A handle that undoes one [`CurrentTraceContext`] transition when closed.
///
/// Dropping the scope closes it; [`close`](Scope::close) is the explicit
/// spelling for call sites that want the restore to read as a statement.
/// Closing never fails and never panics, and a scope revoked by a clearing
/// scope closes as a no-op, so misuse degrades instead of corrupting the
/// store.
#[must_use = "Dropping the scope immediately restores the previous context."]
pub struct Scope {
    inner: ScopeInner,
    // Scopes manipulate thread-local state and must not cross threads.
    _not_send: PhantomData<*const ()>,
}

enum ScopeInner {
    /// Nothing to undo (`maybe_scope` hit the fast path).
    Noop,
    /// The slot was explicitly cleared; closing keeps it cleared.
    Clear,
    /// Closing restores the frame captured when the scope opened, unless a
    /// clearing scope revoked it in the meantime.
    Revert {
        prev: Option<Frame>,
        revoked: Rc<Cell<bool>>,
        decorators: Arc<[Arc<dyn ScopeDecorator>]>,
    },
}

impl Scope {
    fn noop() -> Self {
        Scope {
            inner: ScopeInner::Noop,
            _not_send: PhantomData,
        }
    }

    /// Closes the scope, restoring the previous context.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.inner, ScopeInner::Noop) {
            ScopeInner::Noop | ScopeInner::Clear => {}
            ScopeInner::Revert {
                prev,
                revoked,
                decorators,
            } => {
                if revoked.get() {
                    return;
                }
                let restored = prev.as_ref().map(|frame| frame.context.clone());
                CURRENT.with(|state| {
                    let mut state = state.borrow_mut();
                    if let Some(pos) = state
                        .open
                        .iter()
                        .rposition(|flag| Rc::ptr_eq(flag, &revoked))
                    {
                        state.open.remove(pos);
                    }
                    state.frame = prev;
                });
                for decorator in decorators.iter() {
                    decorator.on_current(restored.as_ref());
                }
            }
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            ScopeInner::Noop => "Noop",
            ScopeInner::Clear => "Clear",
            ScopeInner::Revert { .. } => "Revert",
        };
        f.debug_tuple("Scope").field(&kind).finish()
    }
}

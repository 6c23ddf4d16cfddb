//! Type-keyed context carrier.
//!
//! A [`Context`] travels with a unit of work instead of with a thread: it is
//! handed to asynchronous pipelines at subscription time and consulted when
//! signals are delivered, possibly on other threads. It deliberately has no
//! thread-local machinery of its own; the thread-local mechanism lives in
//! [`crate::trace::CurrentTraceContext`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hasher};
use std::sync::Arc;

/// An immutable, execution-scoped collection of values, keyed by type.
///
/// Write operations return a new context; existing contexts are never
/// mutated, so a clone taken at subscription time stays valid no matter what
/// the subscribing code does afterwards. Cloning is cheap (one `Arc` bump).
///
/// # Examples
///
/// ```
/// use tracescope::Context;
///
/// #[derive(Debug, PartialEq)]
/// struct ValueA(&'static str);
/// #[derive(Debug, PartialEq)]
/// struct ValueB(u64);
///
/// let cx = Context::new().with_value(ValueA("a"));
/// let both = cx.with_value(ValueB(42));
///
/// // The first context is unchanged
/// assert_eq!(cx.get::<ValueB>(), None);
///
/// // The second contains both values
/// assert_eq!(both.get::<ValueA>(), Some(&ValueA("a")));
/// assert_eq!(both.get::<ValueB>(), Some(&ValueB(42)));
/// ```
#[derive(Clone, Default)]
pub struct Context {
    entries: Option<Arc<EntryMap>>,
}

type EntryMap = HashMap<TypeId, Arc<dyn Any + Sync + Send>, BuildHasherDefault<IdHasher>>;

impl Context {
    /// Creates an empty `Context`.
    ///
    /// An empty context does not allocate; use [`with_value`] to create one
    /// that has entries.
    ///
    /// [`with_value`]: Context::with_value()
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns a reference to the entry for the corresponding value type.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .as_ref()?
            .get(&TypeId::of::<T>())?
            .downcast_ref()
    }

    /// Returns a copy of the context with the new value included.
    ///
    /// A value of the same type already present is replaced in the copy; the
    /// original context keeps the old one.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let entries = if let Some(current_entries) = &self.entries {
            let mut inner_entries = (**current_entries).clone();
            inner_entries.insert(TypeId::of::<T>(), Arc::new(value));
            Some(Arc::new(inner_entries))
        } else {
            let mut entries = EntryMap::default();
            entries.insert(TypeId::of::<T>(), Arc::new(value));
            Some(Arc::new(entries))
        };
        Context { entries }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field(
                "entries",
                &self.entries.as_ref().map_or(0, |entries| entries.len()),
            )
            .finish()
    }
}

/// With TypeIds as keys, there's no need to hash them. They are already
/// hashes themselves, coming from the compiler. The IdHasher holds the u64
/// of the TypeId, and then returns it, instead of doing any bit fiddling.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

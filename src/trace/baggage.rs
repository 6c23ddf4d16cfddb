use std::fmt;
use std::sync::{Arc, RwLock};

/// A named baggage entry propagated alongside the trace identifiers.
///
/// The value lives in a cell shared by every context derived from the same
/// root: cloning a [`TraceContext`](crate::trace::TraceContext) clones the
/// handle, not the cell, so an update made in one span is visible from all
/// of its relatives. Spans running on different threads may race on the same
/// cell; updates go through the lock, and [`compare_and_update`] is provided
/// for read-modify-write sequences that must not clobber a concurrent
/// writer.
///
/// [`compare_and_update`]: BaggageField::compare_and_update
#[derive(Clone)]
pub struct BaggageField {
    name: Arc<str>,
    cell: Arc<RwLock<Option<String>>>,
}

impl BaggageField {
    /// Creates an entry with no value yet.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        BaggageField {
            name: name.into(),
            cell: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates an entry holding `value`.
    pub fn with_value(name: impl Into<Arc<str>>, value: impl Into<String>) -> Self {
        BaggageField {
            name: name.into(),
            cell: Arc::new(RwLock::new(Some(value.into()))),
        }
    }

    /// The entry's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current value, if any.
    pub fn value(&self) -> Option<String> {
        match self.cell.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Unconditionally replaces the value. Pass `None` to clear it.
    pub fn update(&self, value: impl Into<Option<String>>) {
        let value = value.into();
        match self.cell.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    /// Replaces the value only if it still equals `expected`.
    ///
    /// Returns whether the update was applied.
    pub fn compare_and_update(
        &self,
        expected: Option<&str>,
        value: impl Into<Option<String>>,
    ) -> bool {
        let mut guard = match self.cell.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.as_deref() == expected {
            *guard = value.into();
            true
        } else {
            false
        }
    }

    /// Whether two handles refer to the same underlying cell.
    pub fn shares_cell(&self, other: &BaggageField) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for BaggageField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaggageField")
            .field("name", &self.name)
            .field("value", &self.value())
            .finish()
    }
}

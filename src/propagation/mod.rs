//! Carrier interfaces for moving a [`TraceContext`] across process
//! boundaries.
//!
//! Propagators serialize a context into whatever carries it over the wire
//! (HTTP headers, message properties) and back. The core treats the wire
//! format as opaque; [`b3`] ships the B3 header convention.
//!
//! [`TraceContext`]: crate::trace::TraceContext

use std::collections::HashMap;

use crate::trace::{TraceContext, TraceResult};

pub mod b3;

pub use b3::{B3Encoding, B3Propagator};

/// Injector provides an interface for adding fields to an underlying
/// carrier like `HashMap`.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// carrier like `HashMap`.
pub trait Extractor {
    /// Get a value for a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}

/// (De)serializes a [`TraceContext`] to and from a wire carrier.
///
/// Missing wire data is not an error: `extract` answers `Ok(None)` so the
/// caller can start a fresh trace. Present-but-malformed data is rejected
/// with a descriptive error, never silently coerced.
pub trait Propagator: Send + Sync + std::fmt::Debug {
    /// Writes `context` into the carrier.
    fn inject(&self, context: &TraceContext, injector: &mut dyn Injector);

    /// Reads a context back out of the carrier, if one is present.
    fn extract(&self, extractor: &dyn Extractor) -> TraceResult<Option<TraceContext>>;

    /// The carrier keys this propagator reads and writes.
    fn fields(&self) -> &'static [&'static str];
}

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::trace::{BaggageField, TraceError, TraceResult};

/// A 16-byte value which identifies a given trace.
///
/// The id is valid if it contains at least one non-zero byte. Ids that fit
/// in 64 bits render as 16 hex digits, wider ids as 32, matching the
/// canonical B3 form.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Invalid trace id
    pub const INVALID: TraceId = TraceId(0);

    /// Create a trace id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// Return the representation of this trace id as a byte array.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// The high 64 bits of the id. Zero for 64-bit trace ids.
    pub const fn high(self) -> u64 {
        (self.0 >> 64) as u64
    }

    /// The low 64 bits of the id.
    pub const fn low(self) -> u64 {
        self.0 as u64
    }

    /// Converts a string in base 16 to a trace id.
    ///
    /// Both 16-digit (64-bit) and 32-digit (128-bit) forms are accepted.
    /// Longer input keeps its low 32 hex digits, consistent with 128-bit
    /// trace-id semantics. Empty or non-hex input is rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use tracescope::trace::TraceId;
    ///
    /// assert!(TraceId::from_hex("596e1787feb11040").is_ok());
    /// assert!(TraceId::from_hex("596e1787feb11040caff89f7f0f229dd").is_ok());
    ///
    /// assert!(TraceId::from_hex("not_hex").is_err());
    /// ```
    pub fn from_hex(hex: &str) -> TraceResult<Self> {
        parse_lenient_hex(hex, 32, "trace id").map(TraceId)
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl Default for TraceId {
    fn default() -> Self {
        TraceId::INVALID
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.high() == 0 {
            f.write_fmt(format_args!("{:016x}", self.low()))
        } else {
            f.write_fmt(format_args!("{:032x}", self.0))
        }
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// An 8-byte value which identifies a given span.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid span id
    pub const INVALID: SpanId = SpanId(0);

    /// Create a span id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// Return the representation of this span id as a byte array.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a span id.
    ///
    /// A span id is always the low 64 bits of whatever was provided: longer
    /// input (for instance a 32-digit string with a zero high word) keeps
    /// its low 16 hex digits. Empty or non-hex input is rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use tracescope::trace::SpanId;
    ///
    /// assert!(SpanId::from_hex("caff89f7f0f229dd").is_ok());
    /// assert!(SpanId::from_hex("not_hex").is_err());
    /// ```
    pub fn from_hex(hex: &str) -> TraceResult<Self> {
        parse_lenient_hex(hex, 16, "span id").map(|id| SpanId(id as u64))
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl Default for SpanId {
    fn default() -> Self {
        SpanId::INVALID
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Parses up to `max_digits` trailing hex digits of `hex` as an unsigned
/// value, validating the whole string first so garbage outside the kept
/// window is still rejected.
fn parse_lenient_hex(hex: &str, max_digits: usize, what: &'static str) -> TraceResult<u128> {
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(TraceError::MalformedId {
            what,
            value: hex.to_string(),
        });
    }
    let window = if hex.len() > max_digits {
        &hex[hex.len() - max_digits..]
    } else {
        hex
    };
    u128::from_str_radix(window, 16).map_err(|_| TraceError::MalformedId {
        what,
        value: hex.to_string(),
    })
}

/// The immutable identity of one span within a trace.
///
/// A `TraceContext` is a value: it can be cloned freely, sent across
/// threads, stored in a [`Context`](crate::Context) carrier, and serialized
/// by a propagator. Once built it never changes; deriving a child produces a
/// new context. The one exception is [`extra`](TraceContext::extra): baggage
/// entries are shared mutable cells, so an update made through any copy is
/// visible through all of them.
///
/// Equality compares the identifiers (trace id, span id, parent id) only, so
/// a context that took a round trip through a carrier still compares equal
/// to the original even if baggage churned in between.
#[derive(Clone)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    parent_id: Option<SpanId>,
    sampled: Option<bool>,
    extra: Arc<[BaggageField]>,
}

impl TraceContext {
    /// Starts building a new context.
    pub fn builder() -> TraceContextBuilder {
        TraceContextBuilder::default()
    }

    pub(crate) fn from_parts(
        trace_id: TraceId,
        span_id: SpanId,
        parent_id: Option<SpanId>,
        sampled: Option<bool>,
        extra: Arc<[BaggageField]>,
    ) -> Self {
        TraceContext {
            trace_id,
            span_id,
            parent_id,
            sampled,
            extra,
        }
    }

    /// The trace id shared by every span of this trace.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// This span's id.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The parent span's id, absent for a root span.
    pub fn parent_id(&self) -> Option<SpanId> {
        self.parent_id
    }

    /// The sampling decision: `None` means not yet decided.
    pub fn sampled(&self) -> Option<bool> {
        self.sampled
    }

    /// Whether this span is positively sampled.
    pub fn is_sampled(&self) -> bool {
        self.sampled == Some(true)
    }

    /// The ordered baggage entries carried alongside the identifiers.
    ///
    /// Entries are forwarded verbatim to derived contexts; the cells are
    /// shared, not copied.
    pub fn extra(&self) -> &[BaggageField] {
        &self.extra
    }

    pub(crate) fn extra_handle(&self) -> Arc<[BaggageField]> {
        Arc::clone(&self.extra)
    }

    /// Looks up the current value of the named baggage entry.
    pub fn baggage(&self, name: &str) -> Option<String> {
        self.extra
            .iter()
            .find(|field| field.name() == name)
            .and_then(|field| field.value())
    }

    /// Canonical lowercase-hex rendering of the trace id: 16 digits when the
    /// high 64 bits are zero, 32 otherwise.
    pub fn trace_id_string(&self) -> String {
        self.trace_id.to_string()
    }

    /// Canonical 16-digit lowercase-hex rendering of the span id.
    pub fn span_id_string(&self) -> String {
        self.span_id.to_string()
    }

    /// Canonical 16-digit lowercase-hex rendering of the parent id, if any.
    pub fn parent_id_string(&self) -> Option<String> {
        self.parent_id.map(|id| id.to_string())
    }
}

impl PartialEq for TraceContext {
    fn eq(&self, other: &Self) -> bool {
        self.trace_id == other.trace_id
            && self.span_id == other.span_id
            && self.parent_id == other.parent_id
    }
}

impl Eq for TraceContext {}

impl Hash for TraceContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.trace_id.hash(state);
        self.span_id.hash(state);
        self.parent_id.hash(state);
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContext")
            .field("trace_id", &self.trace_id)
            .field("span_id", &self.span_id)
            .field("parent_id", &self.parent_id)
            .field("sampled", &self.sampled)
            .field("extra", &self.extra.len())
            .finish()
    }
}

/// Builder for [`TraceContext`].
///
/// A context needs at least a non-zero trace id and span id;
/// [`build`](TraceContextBuilder::build) rejects anything less.
#[derive(Clone, Debug, Default)]
pub struct TraceContextBuilder {
    trace_id: TraceId,
    span_id: SpanId,
    parent_id: Option<SpanId>,
    sampled: Option<bool>,
    extra: Vec<BaggageField>,
}

impl TraceContextBuilder {
    /// Sets the trace id.
    pub fn trace_id(mut self, trace_id: impl Into<TraceId>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Sets the span id.
    pub fn span_id(mut self, span_id: impl Into<SpanId>) -> Self {
        self.span_id = span_id.into();
        self
    }

    /// Sets or clears the parent span id.
    pub fn parent_id(mut self, parent_id: impl Into<Option<SpanId>>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    /// Sets the sampling decision; pass `None` to leave it undecided.
    pub fn sampled(mut self, sampled: impl Into<Option<bool>>) -> Self {
        self.sampled = sampled.into();
        self
    }

    /// Appends a baggage entry. Order is preserved.
    pub fn baggage(mut self, field: BaggageField) -> Self {
        self.extra.push(field);
        self
    }

    /// Replaces the baggage entries with an existing shared list.
    ///
    /// Used when deriving child contexts so the cells stay shared instead of
    /// being copied.
    pub fn extra(mut self, extra: impl IntoIterator<Item = BaggageField>) -> Self {
        self.extra = extra.into_iter().collect();
        self
    }

    /// Builds the context, rejecting zero trace or span ids.
    pub fn build(self) -> TraceResult<TraceContext> {
        if self.trace_id == TraceId::INVALID {
            return Err(TraceError::MissingId("trace id"));
        }
        if self.span_id == SpanId::INVALID {
            return Err(TraceError::MissingId("span id"));
        }
        Ok(TraceContext {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_id: self.parent_id,
            sampled: self.sampled,
            extra: self.extra.into(),
        })
    }
}

//! # B3 Propagator
//!
//! Carries a [`TraceContext`] using B3 headers. Both encodings are
//! supported:
//!
//! 1. Single header:
//!    `b3: {trace_id}-{span_id}-{sampling_state}-{parent_span_id}`
//! 2. Multiple headers:
//!    `x-b3-traceid`, `x-b3-spanid`, `x-b3-parentspanid`, `x-b3-sampled`,
//!    `x-b3-flags`
//!
//! When both forms arrive, the single header takes precedence. Headers are
//! handled lowercase throughout since HTTP and gRPC carriers disagree on
//! case conventions.

use crate::propagation::{Extractor, Injector, Propagator};
use crate::trace::{SpanId, TraceContext, TraceError, TraceId, TraceResult};

const B3_SINGLE_HEADER: &str = "b3";
const B3_TRACE_ID_HEADER: &str = "x-b3-traceid";
const B3_SPAN_ID_HEADER: &str = "x-b3-spanid";
const B3_PARENT_SPAN_ID_HEADER: &str = "x-b3-parentspanid";
const B3_SAMPLED_HEADER: &str = "x-b3-sampled";
const B3_DEBUG_FLAG_HEADER: &str = "x-b3-flags";

const B3_SINGLE_FIELDS: &[&str] = &[B3_SINGLE_HEADER];
const B3_MULTI_FIELDS: &[&str] = &[
    B3_TRACE_ID_HEADER,
    B3_SPAN_ID_HEADER,
    B3_PARENT_SPAN_ID_HEADER,
    B3_SAMPLED_HEADER,
    B3_DEBUG_FLAG_HEADER,
];
const B3_SINGLE_AND_MULTI_FIELDS: &[&str] = &[
    B3_SINGLE_HEADER,
    B3_TRACE_ID_HEADER,
    B3_SPAN_ID_HEADER,
    B3_PARENT_SPAN_ID_HEADER,
    B3_SAMPLED_HEADER,
    B3_DEBUG_FLAG_HEADER,
];

/// Which B3 form to write on inject.
///
/// Extraction always understands both, preferring the single header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum B3Encoding {
    /// Separate `x-b3-*` headers.
    MultipleHeader,
    /// The single `b3` header.
    SingleHeader,
    /// Both at once, for carriers whose consumers disagree.
    SingleAndMultiHeader,
}

/// Extracts and injects [`TraceContext`]s using the B3 header format.
#[derive(Clone, Debug)]
pub struct B3Propagator {
    inject_encoding: B3Encoding,
}

impl Default for B3Propagator {
    fn default() -> Self {
        B3Propagator {
            inject_encoding: B3Encoding::MultipleHeader,
        }
    }
}

impl B3Propagator {
    /// Creates a propagator that injects multiple headers.
    pub fn new() -> Self {
        B3Propagator::default()
    }

    /// Creates a propagator that injects the given encoding.
    pub fn with_encoding(encoding: B3Encoding) -> Self {
        B3Propagator {
            inject_encoding: encoding,
        }
    }

    /// Extract a trace id from a hex encoded value. Wire ids are strict:
    /// exactly 16 or 32 lowercase hex digits.
    fn extract_trace_id(&self, trace_id: &str) -> TraceResult<TraceId> {
        if (trace_id.len() != 16 && trace_id.len() != 32) || !is_lower_hex(trace_id) {
            return Err(TraceError::MalformedId {
                what: "trace id",
                value: trace_id.to_string(),
            });
        }
        TraceId::from_hex(trace_id)
    }

    /// Extract a span id from a hex encoded value: exactly 16 lowercase hex
    /// digits.
    fn extract_span_id(&self, span_id: &str, what: &'static str) -> TraceResult<SpanId> {
        if span_id.len() != 16 || !is_lower_hex(span_id) {
            return Err(TraceError::MalformedId {
                what,
                value: span_id.to_string(),
            });
        }
        SpanId::from_hex(span_id)
    }

    /// Extract the sampling state. `d` (debug) implies sampled; `true` and
    /// `false` are tolerated for interop with older senders.
    fn extract_sampled(&self, sampled: &str, value: &str) -> TraceResult<Option<bool>> {
        match sampled {
            "0" | "false" => Ok(Some(false)),
            "1" | "true" | "d" => Ok(Some(true)),
            _ => Err(TraceError::MalformedHeader {
                format: "b3",
                value: value.to_string(),
            }),
        }
    }

    fn extract_single_header(&self, value: &str) -> TraceResult<TraceContext> {
        let malformed = || TraceError::MalformedHeader {
            format: "b3",
            value: value.to_string(),
        };

        let parts: Vec<&str> = value.split_terminator('-').collect();
        if !(2..=4).contains(&parts.len()) {
            return Err(malformed());
        }

        let trace_id = self.extract_trace_id(parts[0])?;
        let span_id = self.extract_span_id(parts[1], "span id")?;
        let sampled = if parts.len() > 2 {
            self.extract_sampled(parts[2], value)?
        } else {
            None
        };
        let parent_id = if parts.len() == 4 {
            Some(self.extract_span_id(parts[3], "parent id")?)
        } else {
            None
        };

        Ok(TraceContext::from_parts(
            trace_id,
            span_id,
            parent_id,
            sampled,
            Vec::new().into(),
        ))
    }

    fn extract_multi_header(&self, extractor: &dyn Extractor) -> TraceResult<Option<TraceContext>> {
        let trace_id = match extractor.get(B3_TRACE_ID_HEADER) {
            Some(value) => self.extract_trace_id(value)?,
            None => return Ok(None),
        };
        let span_id = match extractor.get(B3_SPAN_ID_HEADER) {
            Some(value) => self.extract_span_id(value, "span id")?,
            None => {
                return Err(TraceError::MalformedHeader {
                    format: "b3",
                    value: format!("{} without {}", B3_TRACE_ID_HEADER, B3_SPAN_ID_HEADER),
                })
            }
        };
        let parent_id = match extractor.get(B3_PARENT_SPAN_ID_HEADER) {
            Some(value) => Some(self.extract_span_id(value, "parent id")?),
            None => None,
        };

        // A debug flag implies a positive sampling decision.
        let sampled = if extractor.get(B3_DEBUG_FLAG_HEADER) == Some("1") {
            Some(true)
        } else {
            match extractor.get(B3_SAMPLED_HEADER) {
                Some(value) => self.extract_sampled(value, value)?,
                None => None,
            }
        };

        Ok(Some(TraceContext::from_parts(
            trace_id,
            span_id,
            parent_id,
            sampled,
            Vec::new().into(),
        )))
    }

    fn inject_single(&self, context: &TraceContext, injector: &mut dyn Injector) {
        let mut value = format!(
            "{}-{}",
            context.trace_id_string(),
            context.span_id_string()
        );
        if let Some(sampled) = context.sampled() {
            value.push('-');
            value.push(if sampled { '1' } else { '0' });
            if let Some(parent) = context.parent_id_string() {
                value.push('-');
                value.push_str(&parent);
            }
        }
        injector.set(B3_SINGLE_HEADER, value);
    }

    fn inject_multi(&self, context: &TraceContext, injector: &mut dyn Injector) {
        injector.set(B3_TRACE_ID_HEADER, context.trace_id_string());
        injector.set(B3_SPAN_ID_HEADER, context.span_id_string());
        if let Some(parent) = context.parent_id_string() {
            injector.set(B3_PARENT_SPAN_ID_HEADER, parent);
        }
        if let Some(sampled) = context.sampled() {
            injector.set(
                B3_SAMPLED_HEADER,
                if sampled { "1" } else { "0" }.to_string(),
            );
        }
    }
}

impl Propagator for B3Propagator {
    fn inject(&self, context: &TraceContext, injector: &mut dyn Injector) {
        match self.inject_encoding {
            B3Encoding::MultipleHeader => self.inject_multi(context, injector),
            B3Encoding::SingleHeader => self.inject_single(context, injector),
            B3Encoding::SingleAndMultiHeader => {
                self.inject_single(context, injector);
                self.inject_multi(context, injector);
            }
        }
    }

    fn extract(&self, extractor: &dyn Extractor) -> TraceResult<Option<TraceContext>> {
        if let Some(single) = extractor.get(B3_SINGLE_HEADER) {
            return self.extract_single_header(single).map(Some);
        }
        self.extract_multi_header(extractor)
    }

    fn fields(&self) -> &'static [&'static str] {
        match self.inject_encoding {
            B3Encoding::MultipleHeader => B3_MULTI_FIELDS,
            B3Encoding::SingleHeader => B3_SINGLE_FIELDS,
            B3Encoding::SingleAndMultiHeader => B3_SINGLE_AND_MULTI_FIELDS,
        }
    }
}

fn is_lower_hex(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

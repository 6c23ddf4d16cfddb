use std::fmt;

use crate::trace::TraceId;

/// Decides whether a new trace should be recorded.
///
/// Sampling is policy, not propagation: the core consults the sampler once
/// when it mints a root span or continues an extracted context whose
/// decision is still open, and carries the verdict in the context from then
/// on. Implementations must be cheap and side-effect free.
pub trait Sampler: Send + Sync + fmt::Debug {
    /// Returns whether spans of the trace identified by `trace_id` should be
    /// recorded.
    fn should_sample(&self, trace_id: TraceId) -> bool;
}

/// Samples every trace.
#[derive(Clone, Debug, Default)]
pub struct AlwaysSampler {
    _private: (),
}

impl AlwaysSampler {
    /// Creates a sampler that records everything.
    pub fn new() -> Self {
        AlwaysSampler::default()
    }
}

impl Sampler for AlwaysSampler {
    fn should_sample(&self, _trace_id: TraceId) -> bool {
        true
    }
}

/// Samples no traces.
#[derive(Clone, Debug, Default)]
pub struct NeverSampler {
    _private: (),
}

impl NeverSampler {
    /// Creates a sampler that records nothing.
    pub fn new() -> Self {
        NeverSampler::default()
    }
}

impl Sampler for NeverSampler {
    fn should_sample(&self, _trace_id: TraceId) -> bool {
        false
    }
}

/// Samples a fixed ratio of traces, decided off the trace id.
///
/// The decision is a pure function of the id, so every participant of a
/// trace that uses the same ratio reaches the same verdict without
/// coordination.
#[derive(Clone, Debug)]
pub struct TraceIdRatioSampler {
    prob: f64,
}

impl TraceIdRatioSampler {
    /// Creates a sampler recording roughly `prob` of all traces; the ratio
    /// is clamped to `0.0..=1.0`.
    pub fn new(prob: f64) -> Self {
        TraceIdRatioSampler {
            prob: prob.clamp(0.0, 1.0),
        }
    }
}

impl Sampler for TraceIdRatioSampler {
    fn should_sample(&self, trace_id: TraceId) -> bool {
        if self.prob >= 1.0 {
            return true;
        }
        if self.prob <= 0.0 {
            return false;
        }
        let threshold = (self.prob * (1u64 << 63) as f64) as u64;
        // Use the low bits so 64-bit and 128-bit participants agree.
        (trace_id.low() >> 1) < threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_and_never_are_constant() {
        let id = TraceId::from(0xdead_beefu128);
        assert!(AlwaysSampler::new().should_sample(id));
        assert!(!NeverSampler::new().should_sample(id));
    }

    #[test]
    fn ratio_bounds_behave_like_constants() {
        let id = TraceId::from(0xdead_beefu128);
        assert!(TraceIdRatioSampler::new(1.0).should_sample(id));
        assert!(!TraceIdRatioSampler::new(0.0).should_sample(id));
        // out-of-range input is clamped, not rejected
        assert!(TraceIdRatioSampler::new(7.5).should_sample(id));
    }

    #[test]
    fn ratio_is_deterministic_per_trace_id() {
        let sampler = TraceIdRatioSampler::new(0.5);
        let id = TraceId::from(0x1234_5678_9abc_def0u128);
        let first = sampler.should_sample(id);
        for _ in 0..8 {
            assert_eq!(sampler.should_sample(id), first);
        }
    }
}

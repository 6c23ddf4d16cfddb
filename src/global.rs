//! Process-wide tracer registry.
//!
//! Instrumentation that cannot thread a [`Tracer`] through its call graph
//! can fall back to the global one. The registry degrades instead of
//! failing: before [`set_tracer`] is called, or if the registry lock was
//! poisoned by a panicking writer, [`tracer`] hands out a disabled tracer,
//! so instrumented code keeps running and only observability is lost.

use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::internal_logging::ts_warn;
use crate::trace::Tracer;

static GLOBAL_TRACER: Lazy<RwLock<Tracer>> = Lazy::new(|| RwLock::new(Tracer::disabled()));

/// Installs the process-wide tracer.
pub fn set_tracer(tracer: Tracer) {
    match GLOBAL_TRACER.write() {
        Ok(mut global) => *global = tracer,
        Err(poisoned) => {
            ts_warn!("global tracer registry lock poisoned, replacing anyway");
            *poisoned.into_inner() = tracer;
        }
    }
}

/// Returns the process-wide tracer, or a disabled tracer when none was
/// installed.
pub fn tracer() -> Tracer {
    match GLOBAL_TRACER.read() {
        Ok(global) => global.clone(),
        Err(poisoned) => {
            ts_warn!("global tracer registry lock poisoned, serving last value");
            poisoned.into_inner().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryReporter;

    #[test]
    fn uninstalled_registry_serves_a_disabled_tracer() {
        // Note: other tests may install a tracer; this only asserts the
        // degraded path never fails.
        let tracer = tracer();
        let span = tracer.new_trace();
        span.end();
    }

    #[test]
    fn installed_tracer_is_served_to_callers() {
        let reporter = InMemoryReporter::new();
        set_tracer(Tracer::builder().with_reporter(reporter.clone()).build());

        let span = tracer().new_trace();
        assert!(span.is_recording());
        span.end();
        assert!(!reporter.spans().is_empty());
    }
}

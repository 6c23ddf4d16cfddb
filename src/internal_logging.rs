//! Internal diagnostics for the crate itself.
//!
//! These macros are for tracescope's own degraded-mode events (malformed
//! wire data, revoked scopes, registry fallbacks). They are not a general
//! logging facility. With the `internal-logs` feature disabled they compile
//! to nothing.
#![allow(unused_macros, unused_imports)]

macro_rules! ts_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "internal-logs")]
        {
            ::tracing::debug!(target: "tracescope", $($arg)*);
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = || ($($arg)*);
        }
    }};
}

macro_rules! ts_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "internal-logs")]
        {
            ::tracing::warn!(target: "tracescope", $($arg)*);
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = || ($($arg)*);
        }
    }};
}

pub(crate) use {ts_debug, ts_warn};

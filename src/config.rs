//! Per-call policy settings.
//!
//! [`CallConfig`] is a small value type copied into every call when it is
//! parsed, so a connection can change its settings without affecting calls
//! already in flight.

use crate::sidecar::MAX_SIDECARS;

/// Fraction of the client timeout after which a call counts as slow.
pub const DEFAULT_SLOW_CALL_FRACTION: f64 = 0.75;

/// Settings governing sidecars and trace logging for inbound calls.
///
/// # Examples
///
/// ```
/// use callframe::config::CallConfig;
///
/// let config = CallConfig::default().with_max_sidecars(2).with_log_all_traces(true);
/// assert_eq!(config.max_sidecars(), 2);
/// assert!(config.log_all_traces());
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CallConfig {
    max_sidecars: usize,
    log_all_traces: bool,
    slow_call_fraction: f64,
}

impl CallConfig {
    /// Cap the number of sidecars a handler may attach.
    #[must_use]
    pub fn with_max_sidecars(mut self, max_sidecars: usize) -> Self {
        self.max_sidecars = max_sidecars;
        self
    }

    /// Log the trace of every call at INFO, not only slow ones.
    #[must_use]
    pub fn with_log_all_traces(mut self, enabled: bool) -> Self {
        self.log_all_traces = enabled;
        self
    }

    /// Set the fraction of the client timeout after which a call is logged
    /// as slow. Values outside `0.0..=1.0` are clamped; NaN keeps the
    /// current value.
    #[must_use]
    pub fn with_slow_call_fraction(mut self, fraction: f64) -> Self {
        if !fraction.is_nan() {
            self.slow_call_fraction = fraction.clamp(0.0, 1.0);
        }
        self
    }

    #[must_use]
    pub const fn max_sidecars(&self) -> usize { self.max_sidecars }

    #[must_use]
    pub const fn log_all_traces(&self) -> bool { self.log_all_traces }

    #[must_use]
    pub const fn slow_call_fraction(&self) -> f64 { self.slow_call_fraction }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            max_sidecars: MAX_SIDECARS,
            log_all_traces: false,
            slow_call_fraction: DEFAULT_SLOW_CALL_FRACTION,
        }
    }
}

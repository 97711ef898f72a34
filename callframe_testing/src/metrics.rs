//! Metric capture with `metrics-util`'s debugging recorder.
//!
//! Taking a snapshot drains what it reports, so each test snapshots once and
//! queries the resulting entries:
//!
//! ```rust
//! use callframe::metrics::{ERRORS_TOTAL, ErrorKind, inc_errors};
//! use callframe_testing::{counter_value, recorder};
//!
//! let (snapshotter, recorder) = recorder();
//! metrics::with_local_recorder(&recorder, || inc_errors(ErrorKind::Parse));
//! let entries = snapshotter.snapshot().into_vec();
//! assert_eq!(counter_value(&entries, ERRORS_TOTAL, ("kind", "parse")), 1);
//! ```

use callframe::remote_method::RemoteMethod;
use metrics::{SharedString, Unit};
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};
use rstest::fixture;

/// One entry of a debugging snapshot.
pub type MetricEntry = (CompositeKey, Option<Unit>, Option<SharedString>, DebugValue);

/// Create a debugging recorder and its snapshotter.
#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn recorder() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    (recorder.snapshotter(), recorder)
}

fn has_label(key: &CompositeKey, name: &str, value: &str) -> bool {
    key.key()
        .labels()
        .any(|label| label.key() == name && label.value() == value)
}

/// Samples recorded in histogram `name` for `method`.
pub fn histogram_samples(entries: &[MetricEntry], name: &str, method: &RemoteMethod) -> Vec<f64> {
    entries
        .iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && has_label(key, "service", method.service_name())
                && has_label(key, "method", method.method_name())
        })
        .flat_map(|(_, _, _, value)| match value {
            DebugValue::Histogram(samples) => samples.iter().map(|sample| sample.into_inner()).collect(),
            _ => Vec::new(),
        })
        .collect()
}

/// Sum of counter `name` over every series carrying `label`.
pub fn counter_value(entries: &[MetricEntry], name: &str, label: (&str, &str)) -> u64 {
    entries
        .iter()
        .filter(|(key, _, _, _)| key.key().name() == name && has_label(key, label.0, label.1))
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => *count,
            _ => 0,
        })
        .sum()
}

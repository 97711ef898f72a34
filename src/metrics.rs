//! Metric helpers for `callframe`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate.

use metrics::{Histogram, counter, histogram};

use crate::remote_method::RemoteMethod;

/// Histogram of time calls spend between being received and being handled.
pub const INBOUND_QUEUE_TIME: &str = "callframe_inbound_queue_time_seconds";
/// Histogram of time handlers spend executing calls.
pub const HANDLER_RUN_TIME: &str = "callframe_handler_run_time_seconds";
/// Counter of responses handed to connections.
pub const RESPONSES_TOTAL: &str = "callframe_responses_total";
/// Counter of error occurrences.
pub const ERRORS_TOTAL: &str = "callframe_errors_total";

/// Kind of response queued for a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The handler produced a success payload.
    Success,
    /// The call failed with a transport-level error code.
    Failure,
    /// The service returned an application error.
    ApplicationError,
}

impl Outcome {
    /// Label value used on [`RESPONSES_TOTAL`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::ApplicationError => "application_error",
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool { matches!(self, Outcome::Success) }
}

/// Category of error counted on [`ERRORS_TOTAL`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// An inbound frame could not be parsed.
    Parse,
    /// A response could not be serialized.
    Serialize,
    /// A response could not be handed to or written by the connection.
    Delivery,
    /// A handler panicked.
    HandlerPanic,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::Serialize => "serialize",
            ErrorKind::Delivery => "delivery",
            ErrorKind::HandlerPanic => "handler_panic",
        }
    }
}

/// Record a queued response with the given outcome.
pub fn inc_responses(outcome: Outcome) {
    counter!(RESPONSES_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

/// Record an error occurrence.
pub fn inc_errors(kind: ErrorKind) { counter!(ERRORS_TOTAL, "kind" => kind.as_str()).increment(1); }

/// Histograms a dispatcher passes to a call's timing recorder.
#[derive(Clone)]
pub struct MethodMetrics {
    /// Receives time spent queued before handling.
    pub queue_time: Histogram,
    /// Receives time spent in the handler.
    pub run_time: Histogram,
}

impl MethodMetrics {
    /// Register histograms labelled with `method`'s service and method name.
    ///
    /// Handles are bound to the recorder installed when this runs.
    #[must_use]
    pub fn for_method(method: &RemoteMethod) -> Self {
        let service = method.service_name().to_owned();
        let name = method.method_name().to_owned();
        Self {
            queue_time: histogram!(
                INBOUND_QUEUE_TIME,
                "service" => service.clone(),
                "method" => name.clone()
            ),
            run_time: histogram!(HANDLER_RUN_TIME, "service" => service, "method" => name),
        }
    }
}

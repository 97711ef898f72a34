//! Introspection snapshots of in-flight calls.

use std::net::SocketAddr;

use serde::Serialize;
use tokio::time::Instant;

use super::InboundCall;
use crate::{header::CallHeader, remote_method::RemoteMethod, timing::CallTiming};

/// Options for [`InboundCall::dump`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DumpRunningCallsRequest {
    /// Attach the call's trace to the snapshot.
    pub include_traces: bool,
}

/// Furthest lifecycle stage a call has reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Parsed,
    Received,
    Handling,
    Completed,
}

impl CallState {
    fn of(timing: &CallTiming) -> Self {
        if timing.handling_completed().is_some() {
            CallState::Completed
        } else if timing.handling_started().is_some() {
            CallState::Handling
        } else if timing.received().is_some() {
            CallState::Received
        } else {
            CallState::Parsed
        }
    }
}

/// Snapshot of one in-flight call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallInProgress {
    pub call_id: u64,
    pub remote_method: RemoteMethod,
    pub remote_address: SocketAddr,
    pub state: CallState,
    /// Microseconds since the call was received; zero before receipt.
    pub micros_elapsed: u64,
    /// Client timeout, if one was declared.
    pub timeout_millis: Option<u64>,
    pub sidecars: usize,
    pub trace: Option<String>,
}

impl<H: CallHeader> InboundCall<H> {
    /// Describe the call for diagnostics.
    #[must_use]
    pub fn dump(&self, req: &DumpRunningCallsRequest) -> CallInProgress {
        let micros_elapsed = self
            .timing
            .elapsed_since_received(Instant::now())
            .map_or(0, |elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
        CallInProgress {
            call_id: self.header.call_id(),
            remote_method: self.remote_method.clone(),
            remote_address: self.connection.remote_address(),
            state: CallState::of(&self.timing),
            micros_elapsed,
            timeout_millis: self
                .header
                .timeout()
                .map(|timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
            sidecars: self.sidecars.len(),
            trace: req.include_traces.then(|| self.trace.dump(true)),
        }
    }
}

//! The server-side representation of one inbound call.
//!
//! An [`InboundCall`] is created by the I/O task when a transfer is parsed,
//! moved to a worker that runs the handler, and finally answered with one of
//! [`InboundCall::respond_success`], [`InboundCall::respond_failure`] or
//! [`InboundCall::respond_application_error`]. Every respond method consumes
//! the call and hands it to its connection's outbound queue, so a call can be
//! answered only once and cannot be touched afterwards:
//!
//! ```compile_fail
//! use callframe::call::InboundCall;
//!
//! fn answer_twice(call: InboundCall) {
//!     call.respond_success(&1_u32);
//!     call.respond_success(&2_u32);
//! }
//! ```
//!
//! The call owns the transfer it was parsed from. The serialized request is
//! only a range into that transfer and is borrowed from the call on demand,
//! so no view of the request can outlive the buffer backing it. Sidecars and
//! the serialized response live in the call as well; the views produced by
//! [`InboundCall::serialize_response_to`] borrow from it in the same way.
//!
//! Only the trace buffer and the connection are shared with other owners.
//! Timing and sidecar methods take `&mut self`: the stage currently owning
//! the call is the only one able to use them.

mod dump;
mod fallback;

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use bincode::error::DecodeError;
pub use dump::{CallInProgress, CallState, DumpRunningCallsRequest};
pub use fallback::FallbackResponder;
use metrics::Histogram;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    config::CallConfig,
    connection::{Connection, QueuedResponse, UserCredentials},
    header::{CallHeader, ParseError, ParsedFrame, ResponseError, RpcRequestHeader},
    message::Message,
    metrics::{ErrorKind, Outcome, inc_errors, inc_responses},
    remote_method::RemoteMethod,
    sidecar::{RpcSidecar, SidecarError, SidecarIndex, SidecarRegistry},
    status::{ErrorStatus, RpcErrorCode, application_error_to_status},
    timing::{CallTiming, Deadline, TimingError},
    trace::Trace,
    transfer::{InboundTransfer, PayloadRange},
};

/// Serialized response owned by the call until it is written.
#[derive(Debug, Default)]
struct ResponseBuffers {
    header: Vec<u8>,
    message: Vec<u8>,
}

/// An inbound call received by the server.
///
/// `H` is the protocol variant that decoded the request header; see
/// [`CallHeader`].
pub struct InboundCall<H: CallHeader = RpcRequestHeader> {
    header: H,
    remote_method: RemoteMethod,
    serialized_request: PayloadRange,
    transfer: InboundTransfer,
    sidecars: SidecarRegistry,
    trace: Arc<Trace>,
    timing: CallTiming,
    connection: Arc<dyn Connection>,
    config: CallConfig,
    response: ResponseBuffers,
}

impl<H: CallHeader> InboundCall<H> {
    /// Parse the header of `transfer` and take ownership of it.
    ///
    /// Only the header is decoded. The request payload is located but left
    /// serialized, to be decoded by the handler with
    /// [`InboundCall::decode_request`].
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the frame is malformed, truncated or uses
    /// an unknown payload codec. The transfer is dropped in that case.
    pub fn parse_from(
        transfer: InboundTransfer,
        connection: Arc<dyn Connection>,
        config: CallConfig,
    ) -> Result<Self, ParseError> {
        let ParsedFrame {
            header,
            remote_method,
            request,
        } = H::parse(transfer.data())?;
        debug!(
            method = %remote_method,
            call_id = header.call_id(),
            request_len = request.len(),
            "parsed inbound call"
        );
        let trace = Arc::new(Trace::new());
        trace.record(format!("Parsed call to {remote_method}"));
        Ok(Self {
            header,
            remote_method,
            serialized_request: request,
            transfer,
            sidecars: SidecarRegistry::with_limit(config.max_sidecars()),
            trace,
            timing: CallTiming::default(),
            connection,
            config,
            response: ResponseBuffers::default(),
        })
    }

    /// Replace the call's trace buffer with a shared one.
    #[must_use]
    pub fn with_trace(mut self, trace: Arc<Trace>) -> Self {
        self.trace = trace;
        self
    }

    /// The serialized request parameter, borrowed from the call's transfer.
    #[must_use]
    pub fn serialized_request(&self) -> &[u8] { self.transfer.view(self.serialized_request) }

    /// Location of the request parameter inside the transfer.
    #[must_use]
    pub const fn request_range(&self) -> PayloadRange { self.serialized_request }

    /// Decode the request parameter using the format the header announced.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the payload does not decode as `M`.
    pub fn decode_request<M: Message>(&self) -> Result<M, DecodeError> {
        self.header
            .payload_format()
            .deserialize(self.serialized_request())
    }

    #[must_use]
    pub fn remote_method(&self) -> &RemoteMethod { &self.remote_method }

    #[must_use]
    pub fn header(&self) -> &H { &self.header }

    #[must_use]
    pub fn call_id(&self) -> u64 { self.header.call_id() }

    #[must_use]
    pub fn remote_address(&self) -> SocketAddr { self.connection.remote_address() }

    #[must_use]
    pub fn user_credentials(&self) -> &UserCredentials { self.connection.user_credentials() }

    #[must_use]
    pub fn trace(&self) -> &Arc<Trace> { &self.trace }

    #[must_use]
    pub fn timing(&self) -> &CallTiming { &self.timing }

    #[must_use]
    pub fn sidecars(&self) -> &SidecarRegistry { &self.sidecars }

    #[must_use]
    pub fn config(&self) -> &CallConfig { &self.config }

    /// Attach a sidecar to the response, returning its index.
    ///
    /// The response message must reference the sidecar by this index; the
    /// call does not interpret sidecar content.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError::LimitExceeded`] when the configured maximum
    /// number of sidecars is already attached.
    pub fn add_rpc_sidecar(
        &mut self,
        sidecar: impl Into<RpcSidecar>,
    ) -> Result<SidecarIndex, SidecarError> {
        self.sidecars.add(sidecar.into())
    }

    /// Stamp the time the call was received.
    ///
    /// # Errors
    ///
    /// Returns [`TimingError::AlreadyRecorded`] if called twice.
    pub fn record_call_received(&mut self) -> Result<(), TimingError> {
        self.timing.mark_received(Instant::now())?;
        self.trace.record("Call received");
        Ok(())
    }

    /// Stamp the time handling started and report the time the call spent
    /// queued to `queue_time`, in seconds.
    ///
    /// # Errors
    ///
    /// Returns a [`TimingError`] if the call was not received yet or handling
    /// already started. Nothing is reported in that case.
    pub fn record_handling_started(
        &mut self,
        queue_time: &Histogram,
    ) -> Result<Duration, TimingError> {
        let queued = self.timing.mark_handling_started(Instant::now())?;
        queue_time.record(queued.as_secs_f64());
        self.trace.record("Handling call");
        Ok(queued)
    }

    /// Stamp the time handling completed and report the handler's run time
    /// to `run_time`, in seconds.
    ///
    /// # Errors
    ///
    /// Returns a [`TimingError`] if handling has not started or already
    /// completed. Nothing is reported in that case.
    pub fn record_handling_completed(
        &mut self,
        run_time: &Histogram,
    ) -> Result<Duration, TimingError> {
        let ran = self.timing.mark_handling_completed(Instant::now())?;
        run_time.record(ran.as_secs_f64());
        self.trace.record("Handler completed");
        Ok(ran)
    }

    /// Upper bound on the client's deadline for this call.
    #[must_use]
    pub fn client_deadline(&self) -> Deadline { self.header.client_deadline(self.timing.received()) }

    /// Whether the client's deadline has already passed.
    ///
    /// Handlers may consult this before expensive work. The call is never
    /// aborted automatically; a late response is still delivered.
    #[must_use]
    pub fn client_timed_out(&self) -> bool { self.client_deadline().has_passed(Instant::now()) }

    /// Answer the call with `response` and queue it on the connection.
    ///
    /// If `response` cannot be serialized the call is answered with a
    /// [`RpcErrorCode::FatalUnknown`] failure instead.
    pub fn respond_success<M: Message>(mut self, response: &M) {
        match self.serialize_response_buffer(response, true) {
            Ok(()) => self.queue_response(Outcome::Success),
            Err(error) => {
                error!(call = %self, %error, "unable to serialize success response");
                self.respond_failure(RpcErrorCode::FatalUnknown, &error);
            }
        }
    }

    /// Answer the call with a transport-level error and queue it on the
    /// connection. The message is rendered from `status`.
    pub fn respond_failure(self, code: RpcErrorCode, status: &impl fmt::Display) {
        let status = ErrorStatus::new(code, status.to_string());
        self.respond_error(&status, Outcome::Failure);
    }

    /// Answer the call with an application error and queue it on the
    /// connection.
    ///
    /// `app_error` is nested in the envelope under `ext_id`; see
    /// [`application_error_to_status`]. If it cannot be encoded the envelope
    /// is sent without the nested payload.
    pub fn respond_application_error<M: Message>(self, ext_id: i32, message: &str, app_error: &M) {
        let status = match application_error_to_status(ext_id, message, app_error) {
            Ok(status) => status,
            Err(error) => {
                error!(call = %self, ext_id, %error, "unable to encode application error");
                ErrorStatus::new(RpcErrorCode::Application, message)
            }
        };
        self.respond_error(&status, Outcome::ApplicationError);
    }

    fn respond_error(mut self, status: &ErrorStatus, outcome: Outcome) {
        match self.serialize_response_buffer(status, false) {
            Ok(()) => self.queue_response(outcome),
            Err(error) => {
                inc_errors(ErrorKind::Serialize);
                error!(call = %self, %error, %status, "unable to serialize error response; dropping call");
            }
        }
    }

    fn queue_response(self, outcome: Outcome) {
        self.trace.record(format!(
            "Queueing {} response",
            if outcome.is_success() {
                "success"
            } else {
                "failure"
            }
        ));
        self.log_trace();
        inc_responses(outcome);
        let connection = Arc::clone(&self.connection);
        connection.queue_response(Box::new(self));
    }

    // On error the previous buffers are left untouched.
    fn serialize_response_buffer<M: Message>(
        &mut self,
        response: &M,
        is_success: bool,
    ) -> Result<(), ResponseError> {
        let message = self.header.payload_format().serialize(response)?;
        let offsets = self
            .sidecars
            .offsets(message.len())
            .ok_or(ResponseError::TooLarge {
                len: message.len() + self.sidecars.total_len(),
            })?;
        let body_len = message.len() + self.sidecars.total_len();
        let header = self
            .header
            .encode_response_header(!is_success, offsets, body_len)?;
        self.response = ResponseBuffers { header, message };
        Ok(())
    }

    /// Append the response to `slices`: the response header, the structured
    /// payload, then every sidecar in registration order.
    ///
    /// Nothing is copied; the views borrow from the call. Before a response
    /// has been serialized nothing is appended.
    pub fn serialize_response_to<'a>(&'a self, slices: &mut Vec<&'a [u8]>) {
        if self.response.header.is_empty() {
            return;
        }
        slices.reserve(2 + self.sidecars.len());
        slices.push(&self.response.header);
        slices.push(&self.response.message);
        slices.extend(self.sidecars.iter().map(RpcSidecar::as_slice));
    }

    /// Log the call's trace if it was slow enough that the client likely
    /// timed out, or if every trace is to be logged.
    ///
    /// Only calls recorded as received can be slow.
    fn log_trace(&self) {
        let elapsed = self.timing.elapsed_since_received(Instant::now());
        if let (Some(elapsed), Some(timeout)) = (elapsed, self.header.timeout()) {
            let threshold = timeout.mul_f64(self.config.slow_call_fraction());
            if elapsed > threshold {
                warn!(
                    call = %self,
                    ?elapsed,
                    ?timeout,
                    "call took long enough that the client likely timed out"
                );
                let dump = self.trace.dump(true);
                if !dump.is_empty() {
                    warn!(call = %self, trace = %dump, "slow call trace");
                }
                return;
            }
        }
        if self.config.log_all_traces() {
            info!(call = %self, ?elapsed, trace = %self.trace.dump(true), "call trace");
        }
    }
}

impl<H: CallHeader> QueuedResponse for InboundCall<H> {
    fn serialize_response_to<'a>(&'a self, slices: &mut Vec<&'a [u8]>) {
        InboundCall::serialize_response_to(self, slices);
    }

    fn call_id(&self) -> u64 { self.header.call_id() }
}

impl<H: CallHeader> fmt::Display for InboundCall<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Call {} from {} (request call id {})",
            self.remote_method,
            self.connection.remote_address(),
            self.header.call_id()
        )
    }
}

impl<H: CallHeader> fmt::Debug for InboundCall<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundCall")
            .field("header", &self.header)
            .field("remote_method", &self.remote_method)
            .field("remote_address", &self.connection.remote_address())
            .field("request_len", &self.serialized_request.len())
            .field("sidecars", &self.sidecars.len())
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

//! Answers for calls lost before their handler responded.

use std::{fmt, sync::Arc};

use tracing::error;

use super::InboundCall;
use crate::{
    connection::{Connection, QueuedResponse},
    format::PayloadFormat,
    header::{CallHeader, ResponseError, RpcResponseHeader},
    metrics::{ErrorKind, Outcome, inc_errors, inc_responses},
    status::{ErrorStatus, RpcErrorCode},
};

/// Enough of a call to answer it with an error after the call itself is gone.
///
/// Taken before a call is handed to code that may unwind.
pub struct FallbackResponder {
    description: String,
    call_id: u64,
    format: PayloadFormat,
    connection: Arc<dyn Connection>,
}

impl<H: CallHeader> InboundCall<H> {
    #[must_use]
    pub fn fallback_responder(&self) -> FallbackResponder {
        FallbackResponder {
            description: self.to_string(),
            call_id: self.header.call_id(),
            format: self.header.payload_format(),
            connection: Arc::clone(&self.connection),
        }
    }
}

impl FallbackResponder {
    /// Queue an error response without sidecars for the call.
    pub fn respond_failure(self, code: RpcErrorCode, status: &impl fmt::Display) {
        let status = ErrorStatus::new(code, status.to_string());
        match self.encode(&status) {
            Ok((header, message)) => {
                inc_responses(Outcome::Failure);
                self.connection.queue_response(Box::new(FallbackResponse {
                    description: self.description,
                    call_id: self.call_id,
                    header,
                    message,
                }));
            }
            Err(error) => {
                inc_errors(ErrorKind::Serialize);
                error!(call = %self, %error, %status, "unable to serialize fallback response; dropping call");
            }
        }
    }

    fn encode(&self, status: &ErrorStatus) -> Result<(Vec<u8>, Vec<u8>), ResponseError> {
        let message = self.format.serialize(status)?;
        let header = RpcResponseHeader {
            call_id: self.call_id,
            is_error: true,
            sidecar_offsets: Vec::new(),
        }
        .encode_prefix(message.len())?;
        Ok((header, message))
    }
}

impl fmt::Display for FallbackResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.description) }
}

impl fmt::Debug for FallbackResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackResponder")
            .field("call", &self.description)
            .field("call_id", &self.call_id)
            .finish_non_exhaustive()
    }
}

struct FallbackResponse {
    description: String,
    call_id: u64,
    header: Vec<u8>,
    message: Vec<u8>,
}

impl QueuedResponse for FallbackResponse {
    fn serialize_response_to<'a>(&'a self, slices: &mut Vec<&'a [u8]>) {
        slices.push(&self.header);
        slices.push(&self.message);
    }

    fn call_id(&self) -> u64 { self.call_id }
}

impl fmt::Display for FallbackResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.description) }
}

//! Error envelopes returned to clients.
//!
//! Transport-level failures carry an [`RpcErrorCode`] and a message.
//! Application-level failures additionally nest a service-specific payload,
//! tagged with an extension id so the client can decode it with the right
//! schema. Both shapes travel in the same [`ErrorStatus`] structure and are
//! delivered exactly like a success response, with the error flag set.

use std::fmt;

use bincode::{
    Decode,
    Encode,
    error::{DecodeError, EncodeError},
};

use crate::message::Message;

/// Reason a call failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum RpcErrorCode {
    /// Unclassified failure on the server.
    FatalUnknown,
    /// The service returned an application-specific error.
    Application,
    /// The requested method does not exist on the service.
    NoSuchMethod,
    /// The requested service is not registered.
    NoSuchService,
    /// The server is overloaded; the client may retry later.
    ServerTooBusy,
    /// The request parameters were invalid.
    InvalidRequest,
    /// The server is shutting down.
    FatalServerShuttingDown,
    /// The request header could not be parsed.
    FatalInvalidRpcHeader,
    /// The request payload could not be deserialized.
    FatalDeserializingRequest,
    /// Client and server speak incompatible protocol versions.
    FatalVersionMismatch,
    /// The client is not authorised to make the call.
    FatalUnauthorized,
}

impl RpcErrorCode {
    /// Whether the error leaves the connection unusable.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            RpcErrorCode::FatalUnknown
                | RpcErrorCode::FatalServerShuttingDown
                | RpcErrorCode::FatalInvalidRpcHeader
                | RpcErrorCode::FatalDeserializingRequest
                | RpcErrorCode::FatalVersionMismatch
                | RpcErrorCode::FatalUnauthorized
        )
    }
}

/// Service-specific error payload nested in an [`ErrorStatus`].
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ApplicationError {
    /// Identifies the schema of `payload`.
    pub ext_id: i32,
    /// Encoded application error message.
    pub payload: Vec<u8>,
}

impl ApplicationError {
    /// Decode the nested payload as `M`.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the payload does not decode as `M`.
    pub fn decode<M: Message>(&self) -> Result<M, DecodeError> { M::from_exact_bytes(&self.payload) }
}

/// Generic error envelope sent in place of a success payload.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ErrorStatus {
    pub code: RpcErrorCode,
    pub message: String,
    pub app_error: Option<ApplicationError>,
}

impl ErrorStatus {
    /// Build a transport-level error envelope.
    #[must_use]
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            app_error: None,
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)?;
        if let Some(app_error) = &self.app_error {
            write!(f, " (application error extension {})", app_error.ext_id)?;
        }
        Ok(())
    }
}

/// Wrap an application error in the generic envelope.
///
/// This is a pure transform; callers may use it to preview the envelope a
/// call would send.
///
/// # Errors
///
/// Returns an [`EncodeError`] if `app_error` cannot be encoded.
///
/// # Examples
///
/// ```
/// use callframe::{
///     message::Message,
///     status::{RpcErrorCode, application_error_to_status},
/// };
///
/// let status = application_error_to_status(42, "bad input", &7_u32).expect("encode");
/// assert_eq!(status.code, RpcErrorCode::Application);
/// let app_error = status.app_error.expect("nested payload");
/// assert_eq!(app_error.ext_id, 42);
/// assert_eq!(app_error.payload, 7_u32.to_bytes().expect("encode"));
/// ```
pub fn application_error_to_status<M: Message>(
    ext_id: i32,
    message: &str,
    app_error: &M,
) -> Result<ErrorStatus, EncodeError> {
    let payload = app_error.to_bytes()?;
    Ok(ErrorStatus {
        code: RpcErrorCode::Application,
        message: message.to_owned(),
        app_error: Some(ApplicationError { ext_id, payload }),
    })
}

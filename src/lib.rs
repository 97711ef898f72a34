#![doc(html_root_url = "https://docs.rs/callframe/latest")]
//! Public API for the `callframe` library.
//!
//! This crate models a single inbound RPC call on the server: it owns the
//! request bytes, builds the response, and applies per-call timing, tracing
//! and deadline policy. A small reactor and an echo service show the call
//! moving from the I/O task to a worker and back to the connection.

pub mod call;
pub mod codec;
pub mod config;
pub mod connection;
pub mod echo;
pub mod format;
pub mod header;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod remote_method;
pub mod server;
pub mod sidecar;
pub mod status;
pub mod timing;
pub mod trace;
pub mod transfer;

#[cfg(test)]
mod test_helpers;

pub use call::{CallInProgress, CallState, DumpRunningCallsRequest, InboundCall};
pub use config::CallConfig;
pub use connection::{ChannelConnection, Connection, QueuedResponse, UserCredentials};
pub use header::{CallHeader, ParseError, ResponseFrame, RpcRequestHeader, RpcResponseHeader};
pub use metrics::{ERRORS_TOTAL, HANDLER_RUN_TIME, INBOUND_QUEUE_TIME, RESPONSES_TOTAL};
pub use remote_method::RemoteMethod;
pub use sidecar::{MAX_SIDECARS, RpcSidecar, SidecarError, SidecarIndex};
pub use status::{ErrorStatus, RpcErrorCode};
pub use transfer::{InboundTransfer, PayloadRange};

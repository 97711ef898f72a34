//! Builders for request frames.

use std::time::Duration;

use bincode::{Encode, config, encode_to_vec};
use callframe::{header::RpcRequestHeader, remote_method::RemoteMethod};

/// Encode a request frame calling `method` with `payload`.
///
/// A zero `timeout` declares no deadline.
///
/// # Panics
///
/// Panics if the payload or header cannot be encoded.
pub fn request_frame<M: Encode>(
    call_id: u64,
    method: &RemoteMethod,
    timeout: Duration,
    payload: &M,
) -> Vec<u8> {
    let payload = encode_to_vec(payload, config::standard()).expect("encode payload");
    RpcRequestHeader::new(call_id)
        .with_timeout(timeout)
        .encode_request(method, &payload)
        .expect("encode request frame")
}

/// Request frame for `Echo.echo` carrying `bytes`.
pub fn echo_request(call_id: u64, bytes: &[u8]) -> Vec<u8> {
    request_frame(
        call_id,
        &RemoteMethod::new("Echo", "echo"),
        Duration::ZERO,
        &bytes.to_vec(),
    )
}

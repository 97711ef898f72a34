//! The `Echo` service served by the demo binary.
//!
//! `Echo.echo` answers with the request bytes. `Echo.echo_sidecar` attaches
//! them as a sidecar and answers with the sidecar's index. Any other method
//! is answered with [`RpcErrorCode::NoSuchMethod`].

use tracing::warn;

use crate::{call::InboundCall, metrics::MethodMetrics, server::CallHandler, status::RpcErrorCode};

pub const SERVICE: &str = "Echo";
pub const ECHO: &str = "echo";
pub const ECHO_SIDECAR: &str = "echo_sidecar";

/// Request and response payload of `Echo.echo`.
pub type EchoPayload = Vec<u8>;

#[derive(Clone, Copy, Debug, Default)]
pub struct EchoService;

impl CallHandler for EchoService {
    fn handle(&self, mut call: InboundCall, metrics: &MethodMetrics) {
        if call.client_timed_out() {
            call.trace().record("Client deadline already passed");
        }
        let method = call.remote_method();
        if method.service_name() != SERVICE {
            let message = format!("no such service {}", method.service_name());
            complete(&mut call, metrics);
            call.respond_failure(RpcErrorCode::NoSuchService, &message);
            return;
        }

        let request: EchoPayload = match call.decode_request() {
            Ok(request) => request,
            Err(error) => {
                complete(&mut call, metrics);
                call.respond_failure(RpcErrorCode::InvalidRequest, &error);
                return;
            }
        };

        let method_name = call.remote_method().method_name().to_owned();
        match method_name.as_str() {
            ECHO => {
                complete(&mut call, metrics);
                call.respond_success(&request);
            }
            ECHO_SIDECAR => match call.add_rpc_sidecar(request) {
                Ok(index) => {
                    complete(&mut call, metrics);
                    call.respond_success(&usize::from(index));
                }
                Err(error) => {
                    complete(&mut call, metrics);
                    call.respond_failure(RpcErrorCode::ServerTooBusy, &error);
                }
            },
            other => {
                let message = format!("no such method {SERVICE}.{other}");
                complete(&mut call, metrics);
                call.respond_failure(RpcErrorCode::NoSuchMethod, &message);
            }
        }
    }
}

fn complete(call: &mut InboundCall, metrics: &MethodMetrics) {
    if let Err(error) = call.record_handling_completed(&metrics.run_time) {
        warn!(call = %call, %error, "unable to record handling completion");
    }
}

#[cfg(test)]
mod tests {
    use metrics::Histogram;
    use rstest::rstest;

    use super::*;
    use crate::{
        config::CallConfig,
        header::{ResponseFrame, RpcRequestHeader},
        message::Message,
        remote_method::RemoteMethod,
        status::ErrorStatus,
        test_helpers::TestConnection,
    };

    fn noop_metrics() -> MethodMetrics {
        MethodMetrics {
            queue_time: Histogram::noop(),
            run_time: Histogram::noop(),
        }
    }

    fn answer(method: &str, payload: &[u8]) -> Vec<u8> {
        let mut connection = TestConnection::new();
        let call = connection.parse(
            &RemoteMethod::new(SERVICE, method),
            RpcRequestHeader::new(1),
            &payload.to_vec(),
            CallConfig::default(),
        );
        EchoService.handle(call, &noop_metrics());
        let mut written = connection.written();
        assert_eq!(written.len(), 1);
        written.remove(0)
    }

    #[test]
    fn echo_returns_request_bytes() {
        let bytes = answer(ECHO, b"hello");
        let frame = ResponseFrame::parse(&bytes).expect("frame");
        assert!(!frame.header.is_error);
        assert_eq!(
            EchoPayload::from_exact_bytes(frame.payload).expect("decode"),
            b"hello"
        );
    }

    #[test]
    fn echo_sidecar_attaches_request() {
        let bytes = answer(ECHO_SIDECAR, b"side");
        let frame = ResponseFrame::parse(&bytes).expect("frame");
        assert_eq!(usize::from_exact_bytes(frame.payload).expect("index"), 0);
        assert_eq!(frame.sidecars, vec![&b"side"[..]]);
    }

    #[rstest]
    #[case("missing")]
    #[case("ECHO")]
    fn unknown_methods_are_rejected(#[case] method: &str) {
        let bytes = answer(method, b"");
        let frame = ResponseFrame::parse(&bytes).expect("frame");
        assert!(frame.header.is_error);
        let status = ErrorStatus::from_exact_bytes(frame.payload).expect("status");
        assert_eq!(status.code, RpcErrorCode::NoSuchMethod);
        assert_eq!(status.message, format!("no such method Echo.{method}"));
    }
}

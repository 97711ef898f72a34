//! End-to-end tests of the echo service behind the reactor.

use std::{sync::Arc, time::Duration};

use callframe::{
    config::CallConfig,
    echo::{ECHO_SIDECAR, EchoService, SERVICE},
    header::ResponseFrame,
    message::Message,
    remote_method::RemoteMethod,
    server::{self, ServeConfig},
    status::{ErrorStatus, RpcErrorCode},
};
use callframe_testing::{
    drive_with_frames,
    drive_with_frames_config,
    echo_request,
    request_frame,
    split_responses,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

fn responses_by_call_id(bytes: &[u8]) -> Vec<(u64, Vec<u8>)> {
    let mut responses: Vec<_> = split_responses(bytes)
        .into_iter()
        .map(|frame| {
            let call_id = ResponseFrame::parse(&frame).expect("response").header.call_id;
            (call_id, frame)
        })
        .collect();
    responses.sort_by_key(|(id, _)| *id);
    responses
}

#[tokio::test]
async fn every_call_is_answered_once() {
    let frames = (1..=5).map(|id| echo_request(id, &[u8::try_from(id).expect("id")])).collect();
    let bytes = drive_with_frames(Arc::new(EchoService), frames)
        .await
        .expect("drive");

    let responses = responses_by_call_id(&bytes);
    assert_eq!(
        responses.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );
    for (id, frame) in responses {
        let response = ResponseFrame::parse(&frame).expect("response");
        let echoed = Vec::<u8>::from_exact_bytes(response.payload).expect("decode");
        assert_eq!(echoed, vec![u8::try_from(id).expect("id")]);
    }
}

#[tokio::test]
async fn echo_sidecar_carries_the_request() {
    let frame = request_frame(
        9,
        &RemoteMethod::new(SERVICE, ECHO_SIDECAR),
        Duration::from_secs(5),
        &b"large blob".to_vec(),
    );
    let bytes = drive_with_frames(Arc::new(EchoService), vec![frame])
        .await
        .expect("drive");
    let response = ResponseFrame::parse(&bytes).expect("response");
    assert_eq!(response.sidecars, vec![&b"large blob"[..]]);
}

#[tokio::test]
async fn sidecar_limit_follows_serve_config() {
    let frame = request_frame(
        3,
        &RemoteMethod::new(SERVICE, ECHO_SIDECAR),
        Duration::ZERO,
        &b"blob".to_vec(),
    );
    let config = ServeConfig {
        call: CallConfig::default().with_max_sidecars(0),
        ..ServeConfig::default()
    };
    let bytes = drive_with_frames_config(Arc::new(EchoService), vec![frame], config)
        .await
        .expect("drive");
    let response = ResponseFrame::parse(&bytes).expect("response");
    assert!(response.header.is_error);
    let status = ErrorStatus::from_exact_bytes(response.payload).expect("status");
    assert_eq!(status.code, RpcErrorCode::ServerTooBusy);
}

#[tokio::test]
async fn unknown_service_is_reported() {
    let frame = request_frame(
        4,
        &RemoteMethod::new("Ledger", "append"),
        Duration::ZERO,
        &Vec::<u8>::new(),
    );
    let bytes = drive_with_frames(Arc::new(EchoService), vec![frame])
        .await
        .expect("drive");
    let response = ResponseFrame::parse(&bytes).expect("response");
    let status = ErrorStatus::from_exact_bytes(response.payload).expect("status");
    assert_eq!(status.code, RpcErrorCode::NoSuchService);
}

#[tokio::test]
async fn malformed_frame_fails_the_connection() {
    let mut garbage = 6_u32.to_be_bytes().to_vec();
    garbage.extend_from_slice(&[0, 0, 0, 1, 0xff, 0xff]);
    let err = drive_with_frames(Arc::new(EchoService), vec![garbage])
        .await
        .expect_err("parse failure");
    assert!(err.to_string().contains("unparseable call"), "{err}");
}

#[tokio::test]
async fn tcp_server_answers_and_shuts_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(server::serve(
        listener,
        Arc::new(EchoService),
        ServeConfig::default(),
        shutdown.clone(),
    ));

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(&echo_request(77, b"over tcp"))
        .await
        .expect("write");
    stream.shutdown().await.expect("shutdown write");
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).await.expect("read");

    let response = ResponseFrame::parse(&bytes).expect("response");
    assert_eq!(response.header.call_id, 77);
    assert_eq!(
        Vec::<u8>::from_exact_bytes(response.payload).expect("decode"),
        b"over tcp"
    );

    shutdown.cancel();
    serving.await.expect("join").expect("serve");
}

#[tokio::test]
async fn shutdown_does_not_wait_for_idle_clients() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(server::serve(
        listener,
        Arc::new(EchoService),
        ServeConfig::default(),
        shutdown.clone(),
    ));

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = echo_request(8, b"then idle");
    stream.write_all(&request).await.expect("write");
    let mut prefix = [0_u8; 4];
    stream.read_exact(&mut prefix).await.expect("answered");

    shutdown.cancel();
    timeout(Duration::from_secs(2), serving)
        .await
        .expect("serve returns while the client stays connected")
        .expect("join")
        .expect("serve");

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.expect("server closed the stream");
    let mut response = prefix.to_vec();
    response.extend(rest);
    assert_eq!(ResponseFrame::parse(&response).expect("response").header.call_id, 8);
}

//! Tests for `callframe` metrics.
//!
//! Histograms and counters are captured with
//! `metrics_util::debugging::DebuggingRecorder`.

use std::time::Duration;

use callframe::{
    config::CallConfig,
    metrics::{
        ERRORS_TOTAL,
        ErrorKind,
        HANDLER_RUN_TIME,
        INBOUND_QUEUE_TIME,
        MethodMetrics,
        Outcome,
        RESPONSES_TOTAL,
        inc_errors,
        inc_responses,
    },
    remote_method::RemoteMethod,
    status::RpcErrorCode,
};
use callframe_testing::{
    RecordingConnection,
    counter_value,
    histogram_samples,
    parse_with,
    recorder,
    request_frame,
};
use metrics_util::debugging::{DebuggingRecorder, Snapshotter};
use rstest::rstest;
use tokio::time::advance;

#[tokio::test(start_paused = true)]
async fn timing_feeds_method_histograms() {
    let (snapshotter, recorder) = recorder();
    let method = RemoteMethod::new("Echo", "echo");
    let histograms = metrics::with_local_recorder(&recorder, || MethodMetrics::for_method(&method));

    let connection = RecordingConnection::new();
    let frame = request_frame(1, &method, Duration::ZERO, &1_u32);
    let mut call = parse_with(frame, &connection, CallConfig::default()).expect("parse");
    call.record_call_received().expect("receive");
    advance(Duration::from_millis(250)).await;
    call.record_handling_started(&histograms.queue_time)
        .expect("start");
    advance(Duration::from_millis(500)).await;
    call.record_handling_completed(&histograms.run_time)
        .expect("complete");

    let metrics = snapshotter.snapshot().into_vec();
    assert_eq!(histogram_samples(&metrics, INBOUND_QUEUE_TIME, &method), vec![0.25]);
    assert_eq!(histogram_samples(&metrics, HANDLER_RUN_TIME, &method), vec![0.5]);
}

#[tokio::test(start_paused = true)]
async fn rejected_timing_records_nothing() {
    let (snapshotter, recorder) = recorder();
    let method = RemoteMethod::new("Echo", "echo");
    let histograms = metrics::with_local_recorder(&recorder, || MethodMetrics::for_method(&method));

    let connection = RecordingConnection::new();
    let frame = request_frame(1, &method, Duration::ZERO, &1_u32);
    let mut call = parse_with(frame, &connection, CallConfig::default()).expect("parse");
    assert!(call.record_handling_started(&histograms.queue_time).is_err());
    assert!(call.record_handling_completed(&histograms.run_time).is_err());

    let metrics = snapshotter.snapshot().into_vec();
    assert!(histogram_samples(&metrics, INBOUND_QUEUE_TIME, &method).is_empty());
    assert!(histogram_samples(&metrics, HANDLER_RUN_TIME, &method).is_empty());
}

#[rstest]
fn responses_are_counted_by_outcome(recorder: (Snapshotter, DebuggingRecorder)) {
    let (snapshotter, recorder) = recorder;
    let method = RemoteMethod::new("Echo", "echo");
    let connection = RecordingConnection::new();
    metrics::with_local_recorder(&recorder, || {
        for (id, outcome) in [Outcome::Success, Outcome::Failure, Outcome::Success]
            .into_iter()
            .enumerate()
        {
            let id = u64::try_from(id).expect("small id");
            let frame = request_frame(id, &method, Duration::ZERO, &1_u32);
            let call = parse_with(frame, &connection, CallConfig::default()).expect("parse");
            match outcome {
                Outcome::Success => call.respond_success(&id),
                _ => call.respond_failure(RpcErrorCode::InvalidRequest, &"bad"),
            }
        }
    });

    let metrics = snapshotter.snapshot().into_vec();
    assert_eq!(counter_value(&metrics, RESPONSES_TOTAL, ("outcome", "success")), 2);
    assert_eq!(counter_value(&metrics, RESPONSES_TOTAL, ("outcome", "failure")), 1);
}

#[rstest]
#[case(ErrorKind::Parse, "parse")]
#[case(ErrorKind::Serialize, "serialize")]
#[case(ErrorKind::Delivery, "delivery")]
#[case(ErrorKind::HandlerPanic, "handler_panic")]
fn error_kinds_are_labelled(
    recorder: (Snapshotter, DebuggingRecorder),
    #[case] kind: ErrorKind,
    #[case] label: &str,
) {
    let (snapshotter, recorder) = recorder;
    metrics::with_local_recorder(&recorder, || inc_errors(kind));
    let metrics = snapshotter.snapshot().into_vec();
    assert_eq!(counter_value(&metrics, ERRORS_TOTAL, ("kind", label)), 1);
}

#[rstest]
fn application_errors_have_their_own_outcome(recorder: (Snapshotter, DebuggingRecorder)) {
    let (snapshotter, recorder) = recorder;
    metrics::with_local_recorder(&recorder, || inc_responses(Outcome::ApplicationError));
    let metrics = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_value(&metrics, RESPONSES_TOTAL, ("outcome", "application_error")),
        1
    );
}

#[rstest]
fn fallback_answers_count_as_failures(recorder: (Snapshotter, DebuggingRecorder)) {
    let (snapshotter, recorder) = recorder;
    let connection = RecordingConnection::new();
    let frame = request_frame(41, &RemoteMethod::new("Echo", "echo"), Duration::ZERO, &1_u32);
    let call = parse_with(frame, &connection, CallConfig::default()).expect("parse");
    let fallback = call.fallback_responder();
    drop(call);
    metrics::with_local_recorder(&recorder, || {
        fallback.respond_failure(RpcErrorCode::FatalUnknown, &"lost");
    });

    assert_eq!(connection.queued_call_ids(), vec![41]);
    let metrics = snapshotter.snapshot().into_vec();
    assert_eq!(counter_value(&metrics, RESPONSES_TOTAL, ("outcome", "failure")), 1);
}

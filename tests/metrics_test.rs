//! Tests for the metrics interceptor.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::sync::Arc;

use futures_util::{FutureExt, stream};
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tokio::sync::{mpsc, oneshot};
use tonic::Status;

use greeter::interceptor::{
    MetricsInterceptor, StreamHandler, StreamServerInterceptor, StreamServerNext, UnaryHandler,
    UnaryServerInterceptor, UnaryServerNext,
};
use greeter::proto::{GreetRequest, GreetResponse};
use greeter::stream::transport::STREAM_BUFFER;
use greeter::stream::{ServerStream, SharedServerStream, TransportServerStream};
use greeter::{CallContext, Metadata, Method, telemetry};

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a metric name and, optionally, one label.
fn counter_total(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| match label {
            Some((k, v)) => key
                .key()
                .labels()
                .any(|l| l.key() == k && l.value() == v),
            None => true,
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

async fn run_unary(name: &str) -> Result<GreetResponse, Status> {
    let chain: Vec<Arc<dyn UnaryServerInterceptor<GreetRequest, GreetResponse>>> =
        vec![Arc::new(MetricsInterceptor::new())];
    let handler: UnaryHandler<GreetRequest, GreetResponse> =
        Arc::new(|_ctx: CallContext, request: GreetRequest| {
            async move {
                if request.name.is_empty() {
                    return Err(Status::invalid_argument("name must not be empty"));
                }
                Ok(GreetResponse::new(format!("Hello, {}!", request.name)))
            }
            .boxed()
        });

    let ctx = CallContext::detached(Method::Greet, Metadata::new());
    UnaryServerNext::new(&chain, &handler)
        .run(ctx, GreetRequest::new(name))
        .await
}

/// Echo every inbound name through a metered bidi chain.
async fn run_chat(names: &[&str]) -> Result<(), Status> {
    let chain: Vec<Arc<dyn StreamServerInterceptor<GreetRequest, GreetResponse>>> =
        vec![Arc::new(MetricsInterceptor::new())];
    let handler: StreamHandler<GreetRequest, GreetResponse> =
        Arc::new(|stream: SharedServerStream<GreetRequest, GreetResponse>| {
            async move {
                while let Some(request) = stream.recv().await? {
                    stream.send(GreetResponse::new(request.name)).await?;
                }
                Ok::<(), Status>(())
            }
            .boxed()
        });

    let requests: Vec<Result<GreetRequest, Status>> =
        names.iter().map(|n| Ok(GreetRequest::new(*n))).collect();
    let (flush, _header) = oneshot::channel();
    let ctx = CallContext::new(Method::GreetChat, Metadata::new(), None, flush);
    let (tx, _rx) = mpsc::channel(STREAM_BUFFER);
    let stream = TransportServerStream::new(ctx, Box::pin(stream::iter(requests)), tx);

    StreamServerNext::new(&chain, &handler)
        .run(Arc::new(stream))
        .await
}

// ============================================================================
// Tests
// ============================================================================

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn successful_unary_call_records_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(run_unary("alice"))
        })
    });
    assert!(result.is_ok());

    let snapshot = snapshotter.snapshot().into_vec();

    let count = counter_total(&snapshot, telemetry::CALLS_TOTAL, Some(("code", "Ok")));
    assert_eq!(count, 1, "expected 1 call counter");

    assert!(
        has_histogram(&snapshot, telemetry::CALL_DURATION_SECONDS),
        "expected a duration histogram entry"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failed_unary_call_records_its_code() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(run_unary("")))
    });
    assert!(result.is_err());

    let snapshot = snapshotter.snapshot().into_vec();

    let failed = counter_total(
        &snapshot,
        telemetry::CALLS_TOTAL,
        Some(("code", "InvalidArgument")),
    );
    assert_eq!(failed, 1, "expected 1 call counter for error");
    assert_eq!(
        counter_total(&snapshot, telemetry::CALLS_TOTAL, Some(("code", "Ok"))),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn stream_call_counts_messages_by_direction() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(run_chat(&["a", "b", "c"]))
        })
    });
    assert!(result.is_ok());

    let snapshot = snapshotter.snapshot().into_vec();

    assert_eq!(
        counter_total(&snapshot, telemetry::CALLS_TOTAL, Some(("method", "GreetChat"))),
        1
    );
    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::STREAM_MESSAGES_TOTAL,
            Some(("direction", "inbound")),
        ),
        3
    );
    assert_eq!(
        counter_total(
            &snapshot,
            telemetry::STREAM_MESSAGES_TOTAL,
            Some(("direction", "outbound")),
        ),
        3
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    run_unary("alice").await.unwrap();
    run_chat(&["a"]).await.unwrap();
}

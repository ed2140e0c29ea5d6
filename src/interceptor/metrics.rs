//! Server call metrics.
//!
//! Emits the metrics named in [`telemetry`](crate::telemetry) through the
//! `metrics` facade. Without an installed recorder every call is a no-op.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tonic::{Code, Status};

use super::{StreamServerInterceptor, StreamServerNext, UnaryServerInterceptor, UnaryServerNext};
use crate::context::CallContext;
use crate::method::Method;
use crate::stream::{Payload, ServerStreamWrapper, SharedServerStream, StreamHooks};
use crate::telemetry;

/// Records call counts, durations and stream message counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsInterceptor;

impl MetricsInterceptor {
    pub fn new() -> Self {
        Self
    }

    fn record_call(method: Method, code: Code, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64();
        metrics::counter!(telemetry::CALLS_TOTAL,
            "method" => method.name(),
            "code" => format!("{code:?}"),
        )
        .increment(1);
        metrics::histogram!(telemetry::CALL_DURATION_SECONDS,
            "method" => method.name(),
        )
        .record(elapsed);
    }
}

fn code_of<T>(result: &Result<T, Status>) -> Code {
    match result {
        Ok(_) => Code::Ok,
        Err(status) => status.code(),
    }
}

struct MessageCounter {
    method: Method,
}

impl<In, Out> StreamHooks<In, Out> for MessageCounter {
    fn on_recv(&self, _message: &In) {
        metrics::counter!(telemetry::STREAM_MESSAGES_TOTAL,
            "method" => self.method.name(),
            "direction" => "inbound",
        )
        .increment(1);
    }

    fn on_send(&self, _message: &Out) {
        metrics::counter!(telemetry::STREAM_MESSAGES_TOTAL,
            "method" => self.method.name(),
            "direction" => "outbound",
        )
        .increment(1);
    }
}

#[async_trait]
impl<Req: Payload, Res: Payload> UnaryServerInterceptor<Req, Res> for MetricsInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Req,
        next: UnaryServerNext<'_, Req, Res>,
    ) -> Result<Res, Status> {
        let method = ctx.method();
        let start = Instant::now();
        let result = next.run(ctx, request).await;
        Self::record_call(method, code_of(&result), start);
        result
    }
}

#[async_trait]
impl<Req: Payload, Res: Payload> StreamServerInterceptor<Req, Res> for MetricsInterceptor {
    async fn intercept(
        &self,
        stream: SharedServerStream<Req, Res>,
        next: StreamServerNext<'_, Req, Res>,
    ) -> Result<(), Status> {
        let method = stream.context().method();
        let start = Instant::now();
        let counted = ServerStreamWrapper::new(stream, MessageCounter { method });
        let result = next.run(Arc::new(counted)).await;
        Self::record_call(method, code_of(&result), start);
        result
    }
}

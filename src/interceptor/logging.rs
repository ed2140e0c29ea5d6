//! Structured call logging.
//!
//! Call boundaries are logged at `info`, individual stream messages at
//! `debug`. Failed calls are logged at `warn` with their status code.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tonic::Status;
use tracing::{debug, info, warn};

use super::{
    StreamClientInterceptor, StreamClientNext, StreamServerInterceptor, StreamServerNext,
    UnaryClientInterceptor, UnaryClientNext, UnaryServerInterceptor, UnaryServerNext,
};
use crate::client::{ClientCall, UnaryResponse};
use crate::context::CallContext;
use crate::method::Method;
use crate::stream::{
    BoxClientStream, ClientStreamWrapper, Payload, ServerStreamWrapper, SharedServerStream,
    StreamHooks,
};

/// Logs every call and stream message passing through it.
///
/// Works on both sides; `name` tells instances apart in the log.
#[derive(Debug, Clone)]
pub struct LoggingInterceptor {
    name: &'static str,
}

impl LoggingInterceptor {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new("logging")
    }
}

struct MessageLog {
    interceptor: &'static str,
    method: Method,
}

impl<In: Debug, Out: Debug> StreamHooks<In, Out> for MessageLog {
    fn on_recv(&self, message: &In) {
        debug!(
            interceptor = self.interceptor,
            method = %self.method,
            direction = "inbound",
            payload = ?message,
            "stream message received"
        );
    }

    fn on_send(&self, message: &Out) {
        debug!(
            interceptor = self.interceptor,
            method = %self.method,
            direction = "outbound",
            payload = ?message,
            "stream message sent"
        );
    }

    fn on_error(&self, status: &Status) {
        debug!(
            interceptor = self.interceptor,
            method = %self.method,
            code = ?status.code(),
            error = status.message(),
            "stream message failed"
        );
    }
}

fn log_outcome(interceptor: &'static str, method: Method, status: Option<&Status>, start: Instant) {
    let elapsed = start.elapsed();
    match status {
        None => info!(interceptor, %method, ?elapsed, "[post] call finished"),
        Some(status) => warn!(
            interceptor,
            %method,
            ?elapsed,
            code = ?status.code(),
            error = status.message(),
            "[post] call failed"
        ),
    }
}

#[async_trait]
impl<Req: Payload, Res: Payload> UnaryServerInterceptor<Req, Res> for LoggingInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Req,
        next: UnaryServerNext<'_, Req, Res>,
    ) -> Result<Res, Status> {
        let method = ctx.method();
        info!(
            interceptor = self.name,
            %method,
            metadata = %ctx.metadata(),
            ?request,
            "[pre] unary call"
        );
        let start = Instant::now();
        let result = next.run(ctx, request).await;
        if let Ok(response) = &result {
            debug!(interceptor = self.name, %method, ?response, "unary response");
        }
        log_outcome(self.name, method, result.as_ref().err(), start);
        result
    }
}

#[async_trait]
impl<Req: Payload, Res: Payload> StreamServerInterceptor<Req, Res> for LoggingInterceptor {
    async fn intercept(
        &self,
        stream: SharedServerStream<Req, Res>,
        next: StreamServerNext<'_, Req, Res>,
    ) -> Result<(), Status> {
        let method = stream.context().method();
        info!(
            interceptor = self.name,
            %method,
            metadata = %stream.context().metadata(),
            "[pre] stream opened"
        );
        let hooks = MessageLog {
            interceptor: self.name,
            method,
        };
        let start = Instant::now();
        let result = next
            .run(Arc::new(ServerStreamWrapper::new(stream, hooks)))
            .await;
        log_outcome(self.name, method, result.as_ref().err(), start);
        result
    }
}

#[async_trait]
impl<Req: Payload, Res: Payload> UnaryClientInterceptor<Req, Res> for LoggingInterceptor {
    async fn intercept(
        &self,
        call: ClientCall,
        request: Req,
        next: UnaryClientNext<'_, Req, Res>,
    ) -> Result<UnaryResponse<Res>, Status> {
        let method = call.method();
        info!(interceptor = self.name, %method, ?request, "[pre] unary call");
        let start = Instant::now();
        let result = next.run(call, request).await;
        if let Ok(response) = &result {
            debug!(
                interceptor = self.name,
                %method,
                response = ?response.message,
                "unary response"
            );
        }
        log_outcome(self.name, method, result.as_ref().err(), start);
        result
    }
}

#[async_trait]
impl<Req: Payload, Res: Payload> StreamClientInterceptor<Req, Res> for LoggingInterceptor {
    async fn intercept(
        &self,
        call: ClientCall,
        next: StreamClientNext<'_, Req, Res>,
    ) -> Result<BoxClientStream<Req, Res>, Status> {
        let method = call.method();
        info!(interceptor = self.name, %method, "[pre] opening stream");
        let start = Instant::now();
        let result = next.run(call).await;
        log_outcome(self.name, method, result.as_ref().err(), start);
        let stream = result?;
        let hooks = MessageLog {
            interceptor: self.name,
            method,
        };
        Ok(Box::new(ClientStreamWrapper::new(stream, hooks)))
    }
}

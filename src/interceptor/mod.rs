//! Interceptor chains.
//!
//! An interceptor receives the call plus a `Next` handle for the rest of
//! the chain. Running `next` passes control inward; code before it is the
//! pre-hook and code after it is the post-hook. For interceptors `[A, B]`
//! around handler `H` the order is `A.pre, B.pre, H, B.post, A.post`.
//!
//! Stream interceptors that need to see individual messages wrap the
//! stream with [`ServerStreamWrapper`](crate::stream::ServerStreamWrapper)
//! or [`ClientStreamWrapper`](crate::stream::ClientStreamWrapper).
//!
//! Chains are plain slices built once at startup. They hold no per-call
//! state.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tonic::Status;

use crate::client::{ClientCall, UnaryResponse};
use crate::context::CallContext;
use crate::stream::{BoxClientStream, Payload, SharedServerStream};

pub mod logging;
pub mod metrics;

pub use logging::LoggingInterceptor;
pub use metrics::MetricsInterceptor;

/// Terminal handler of a unary server chain.
pub type UnaryHandler<Req, Res> =
    Arc<dyn Fn(CallContext, Req) -> BoxFuture<'static, Result<Res, Status>> + Send + Sync>;

/// Terminal handler of a stream server chain.
pub type StreamHandler<Req, Res> =
    Arc<dyn Fn(SharedServerStream<Req, Res>) -> BoxFuture<'static, Result<(), Status>> + Send + Sync>;

/// Terminal invoker of a unary client chain: performs the call on the wire.
pub type UnaryInvoker<Req, Res> = Arc<
    dyn Fn(ClientCall, Req) -> BoxFuture<'static, Result<UnaryResponse<Res>, Status>> + Send + Sync,
>;

/// Terminal opener of a stream client chain: opens the stream on the wire.
pub type Streamer<Req, Res> = Arc<
    dyn Fn(ClientCall) -> BoxFuture<'static, Result<BoxClientStream<Req, Res>, Status>> + Send + Sync,
>;

// ============================================================================
// Server
// ============================================================================

/// Intercepts unary calls on the server.
#[async_trait]
pub trait UnaryServerInterceptor<Req, Res>: Send + Sync {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Req,
        next: UnaryServerNext<'_, Req, Res>,
    ) -> Result<Res, Status>;
}

/// Intercepts streaming calls on the server.
#[async_trait]
pub trait StreamServerInterceptor<Req, Res>: Send + Sync {
    async fn intercept(
        &self,
        stream: SharedServerStream<Req, Res>,
        next: StreamServerNext<'_, Req, Res>,
    ) -> Result<(), Status>;
}

/// The rest of a unary server chain.
pub struct UnaryServerNext<'a, Req, Res> {
    chain: &'a [Arc<dyn UnaryServerInterceptor<Req, Res>>],
    handler: &'a UnaryHandler<Req, Res>,
}

impl<'a, Req: Payload, Res: Payload> UnaryServerNext<'a, Req, Res> {
    pub fn new(
        chain: &'a [Arc<dyn UnaryServerInterceptor<Req, Res>>],
        handler: &'a UnaryHandler<Req, Res>,
    ) -> Self {
        Self { chain, handler }
    }

    pub async fn run(self, ctx: CallContext, request: Req) -> Result<Res, Status> {
        match self.chain.split_first() {
            Some((first, rest)) => {
                let next = Self::new(rest, self.handler);
                first.intercept(ctx, request, next).await
            }
            None => (self.handler)(ctx, request).await,
        }
    }
}

/// The rest of a stream server chain.
pub struct StreamServerNext<'a, Req, Res> {
    chain: &'a [Arc<dyn StreamServerInterceptor<Req, Res>>],
    handler: &'a StreamHandler<Req, Res>,
}

impl<'a, Req: Payload, Res: Payload> StreamServerNext<'a, Req, Res> {
    pub fn new(
        chain: &'a [Arc<dyn StreamServerInterceptor<Req, Res>>],
        handler: &'a StreamHandler<Req, Res>,
    ) -> Self {
        Self { chain, handler }
    }

    pub async fn run(self, stream: SharedServerStream<Req, Res>) -> Result<(), Status> {
        match self.chain.split_first() {
            Some((first, rest)) => {
                let next = Self::new(rest, self.handler);
                first.intercept(stream, next).await
            }
            None => (self.handler)(stream).await,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Intercepts unary calls on the client.
#[async_trait]
pub trait UnaryClientInterceptor<Req, Res>: Send + Sync {
    async fn intercept(
        &self,
        call: ClientCall,
        request: Req,
        next: UnaryClientNext<'_, Req, Res>,
    ) -> Result<UnaryResponse<Res>, Status>;
}

/// Intercepts the opening of streaming calls on the client.
///
/// The returned stream is what the caller drives; wrap it to observe
/// individual messages.
#[async_trait]
pub trait StreamClientInterceptor<Req, Res>: Send + Sync {
    async fn intercept(
        &self,
        call: ClientCall,
        next: StreamClientNext<'_, Req, Res>,
    ) -> Result<BoxClientStream<Req, Res>, Status>;
}

/// The rest of a unary client chain.
pub struct UnaryClientNext<'a, Req, Res> {
    chain: &'a [Arc<dyn UnaryClientInterceptor<Req, Res>>],
    invoker: &'a UnaryInvoker<Req, Res>,
}

impl<'a, Req: Payload, Res: Payload> UnaryClientNext<'a, Req, Res> {
    pub fn new(
        chain: &'a [Arc<dyn UnaryClientInterceptor<Req, Res>>],
        invoker: &'a UnaryInvoker<Req, Res>,
    ) -> Self {
        Self { chain, invoker }
    }

    pub async fn run(self, call: ClientCall, request: Req) -> Result<UnaryResponse<Res>, Status> {
        match self.chain.split_first() {
            Some((first, rest)) => {
                let next = Self::new(rest, self.invoker);
                first.intercept(call, request, next).await
            }
            None => (self.invoker)(call, request).await,
        }
    }
}

/// The rest of a stream client chain.
pub struct StreamClientNext<'a, Req, Res> {
    chain: &'a [Arc<dyn StreamClientInterceptor<Req, Res>>],
    streamer: &'a Streamer<Req, Res>,
}

impl<'a, Req: Payload, Res: Payload> StreamClientNext<'a, Req, Res> {
    pub fn new(
        chain: &'a [Arc<dyn StreamClientInterceptor<Req, Res>>],
        streamer: &'a Streamer<Req, Res>,
    ) -> Self {
        Self { chain, streamer }
    }

    pub async fn run(self, call: ClientCall) -> Result<BoxClientStream<Req, Res>, Status> {
        match self.chain.split_first() {
            Some((first, rest)) => {
                let next = Self::new(rest, self.streamer);
                first.intercept(call, next).await
            }
            None => (self.streamer)(call).await,
        }
    }
}

//! gRPC service implementation.
//!
//! [`GreeterServer`] routes `greeter.v1.Greeter` paths to the handlers of a
//! [`HandlerRegistry`]. Every method is served through tonic's streaming
//! path; each call gets its own [`CallContext`], runs on its own task
//! through the interceptor chains and ends with a final status that
//! carries the trailer.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::{Body, BoxFuture, Service, StdError, http};
use tonic::server::{Grpc, NamedService, StreamingService};
use tonic::Status;
use tracing::{Instrument, debug, info_span};

use super::config::LimitsConfig;
use super::lifecycle::ActiveCalls;
use super::registry::{GreetServerStream, Handler, HandlerRegistry};
use crate::context::CallContext;
use crate::interceptor::{
    StreamServerInterceptor, StreamServerNext, UnaryServerInterceptor, UnaryServerNext,
};
use crate::metadata::Metadata;
use crate::method::Method;
use crate::proto::{GreetRequest, GreetResponse, SERVICE_NAME};
use crate::stream::transport::STREAM_BUFFER;
use crate::stream::{ServerStream, TransportServerStream};

type UnaryChain = Vec<Arc<dyn UnaryServerInterceptor<GreetRequest, GreetResponse>>>;
type StreamChain = Vec<Arc<dyn StreamServerInterceptor<GreetRequest, GreetResponse>>>;

/// The greeter gRPC service.
#[derive(Clone)]
pub struct GreeterServer {
    inner: Arc<Inner>,
}

struct Inner {
    registry: HandlerRegistry,
    unary: UnaryChain,
    stream: StreamChain,
    limits: LimitsConfig,
    active: ActiveCalls,
}

impl std::fmt::Debug for GreeterServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GreeterServer")
            .field("methods", &self.inner.registry.methods())
            .field("unary_interceptors", &self.inner.unary.len())
            .field("stream_interceptors", &self.inner.stream.len())
            .field("limits", &self.inner.limits)
            .finish()
    }
}

/// Builder for [`GreeterServer`].
///
/// Interceptors run in the order they are added.
#[derive(Default)]
pub struct GreeterServerBuilder {
    registry: HandlerRegistry,
    unary: UnaryChain,
    stream: StreamChain,
    limits: LimitsConfig,
}

impl GreeterServerBuilder {
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn unary_interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: UnaryServerInterceptor<GreetRequest, GreetResponse> + 'static,
    {
        self.unary.push(Arc::new(interceptor));
        self
    }

    pub fn stream_interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: StreamServerInterceptor<GreetRequest, GreetResponse> + 'static,
    {
        self.stream.push(Arc::new(interceptor));
        self
    }

    /// Add an interceptor to both the unary and the stream chain.
    pub fn interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: UnaryServerInterceptor<GreetRequest, GreetResponse>
            + StreamServerInterceptor<GreetRequest, GreetResponse>
            + 'static,
    {
        let interceptor = Arc::new(interceptor);
        self.unary.push(interceptor.clone());
        self.stream.push(interceptor);
        self
    }

    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn build(self) -> GreeterServer {
        GreeterServer {
            inner: Arc::new(Inner {
                registry: self.registry,
                unary: self.unary,
                stream: self.stream,
                limits: self.limits,
                active: ActiveCalls::new(),
            }),
        }
    }
}

impl GreeterServer {
    pub fn builder() -> GreeterServerBuilder {
        GreeterServerBuilder::default()
    }

    /// Server with `registry` and no interceptors.
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::builder().registry(registry).build()
    }

    /// Calls currently in flight.
    pub fn active_calls(&self) -> &ActiveCalls {
        &self.inner.active
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.inner.limits
    }

    /// Set up a call and start its handler task.
    ///
    /// Resolves once the handler flushed the response header.
    async fn start(
        self,
        method: Method,
        request: tonic::Request<Streaming<GreetRequest>>,
    ) -> Result<tonic::Response<CallStream>, Status> {
        let (metadata, _extensions, inbound) = request.into_parts();
        let deadline = self
            .inner
            .limits
            .request_timeout()
            .map(|timeout| Instant::now() + timeout);
        let (flush, header) = oneshot::channel();
        let ctx = CallContext::new(
            method,
            Metadata::from_metadata_map(&metadata),
            deadline,
            flush,
        );

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let transport = Arc::new(TransportServerStream::new(ctx.clone(), Box::pin(inbound), tx));
        let guard = self.inner.active.track();
        let span = info_span!("call", %method);
        tokio::spawn(
            async move {
                let _guard = guard;
                let result = self.run(method, transport.clone(), deadline).await;
                transport.finish(result).await;
            }
            .instrument(span),
        );

        // A handler task that died without flushing leaves an empty header.
        let header = header.await.unwrap_or_default();
        let mut response = tonic::Response::new(CallStream::new(rx, ctx));
        header
            .write_into(response.metadata_mut())
            .map_err(Status::from)?;
        Ok(response)
    }

    /// Run the handler for `method` through the matching interceptor chain.
    async fn run(
        &self,
        method: Method,
        stream: GreetServerStream,
        deadline: Option<Instant>,
    ) -> Result<(), Status> {
        let Some(handler) = self.inner.registry.get(method) else {
            return Err(Status::unimplemented(format!("{method} is not registered")));
        };
        let ctx = stream.context().clone();

        let call = async {
            match handler {
                Handler::Unary(handler) => {
                    let request = stream
                        .recv()
                        .await?
                        .ok_or_else(|| Status::invalid_argument("missing request message"))?;
                    let response = UnaryServerNext::new(&self.inner.unary, handler)
                        .run(ctx.clone(), request)
                        .await?;
                    stream.send(response).await
                }
                Handler::Stream(handler) => {
                    StreamServerNext::new(&self.inner.stream, handler)
                        .run(Arc::clone(&stream))
                        .await
                }
            }
        };

        let Some(deadline) = deadline else {
            return call.await;
        };
        match tokio::time::timeout_at(deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                ctx.cancel_token().cancel();
                Err(Status::deadline_exceeded("request timed out"))
            }
        }
    }
}

impl NamedService for GreeterServer {
    const NAME: &'static str = SERVICE_NAME;
}

impl<B> Service<http::Request<B>> for GreeterServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let Some(method) = Method::from_path(req.uri().path()) else {
            let path = req.uri().path().to_owned();
            return Box::pin(async move {
                debug!(%path, "unknown method");
                Ok(Status::unimplemented(format!("unknown method {path}")).into_http())
            });
        };

        let svc = CallService {
            server: self.clone(),
            method,
        };
        Box::pin(async move {
            let mut grpc = Grpc::new(ProstCodec::<GreetResponse, GreetRequest>::default());
            Ok(grpc.streaming(svc, req).await)
        })
    }
}

/// Adapter handing one decoded call to [`GreeterServer::start`].
struct CallService {
    server: GreeterServer,
    method: Method,
}

impl StreamingService<GreetRequest> for CallService {
    type Response = GreetResponse;
    type ResponseStream = CallStream;
    type Future = BoxFuture<tonic::Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: tonic::Request<Streaming<GreetRequest>>) -> Self::Future {
        let server = self.server.clone();
        Box::pin(server.start(self.method, request))
    }
}

pin_project! {
    /// Response side of one call.
    ///
    /// Dropping it before the call finished (the client went away)
    /// cancels the call.
    pub struct CallStream {
        #[pin]
        inner: ReceiverStream<Result<GreetResponse, Status>>,
        ctx: CallContext,
    }

    impl PinnedDrop for CallStream {
        fn drop(this: Pin<&mut Self>) {
            this.project().ctx.cancel_token().cancel();
        }
    }
}

impl CallStream {
    fn new(rx: mpsc::Receiver<Result<GreetResponse, Status>>, ctx: CallContext) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            ctx,
        }
    }
}

impl Stream for CallStream {
    type Item = Result<GreetResponse, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

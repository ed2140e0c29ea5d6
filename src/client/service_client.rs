//! [`GreeterClient`]: calls into a greeterd server over gRPC.
//!
//! Every call runs through the client interceptor chains. Unary calls go
//! through the unary chain; the three streaming calls are opened through
//! the stream chain and handed back as typed handles from
//! [`calls`](super::calls).

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tonic::Status;
use tonic::client::Grpc;
use tonic::transport::{Channel, Endpoint};
use tracing::info;

use super::calls::{self, BidiCall, ClientStreamingCall, ServerStreamingCall};
use super::{CallOptions, ClientCall, UnaryResponse};
use crate::Result;
use crate::interceptor::{
    StreamClientInterceptor, StreamClientNext, Streamer, UnaryClientInterceptor, UnaryClientNext,
    UnaryInvoker,
};
use crate::method::Method;
use crate::proto::{GreetRequest, GreetResponse};
use crate::stream::{BoxClientStream, ClientStream, TransportClientStream};

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URI, e.g. `http://localhost:8080`.
    pub address: String,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:8080".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// A client for the greeter service.
///
/// Cloning is cheap and clones share the underlying connection.
#[derive(Clone)]
pub struct GreeterClient {
    grpc: Grpc<Channel>,
    unary: Vec<Arc<dyn UnaryClientInterceptor<GreetRequest, GreetResponse>>>,
    stream: Vec<Arc<dyn StreamClientInterceptor<GreetRequest, GreetResponse>>>,
}

impl std::fmt::Debug for GreeterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GreeterClient")
            .field("unary_interceptors", &self.unary.len())
            .field("stream_interceptors", &self.stream.len())
            .finish_non_exhaustive()
    }
}

impl GreeterClient {
    /// Connect to a greeterd server, waiting until the channel is ready.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = GreeterClient::connect(&ClientConfig::default()).await?;
    /// ```
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let channel = Endpoint::from_shared(config.address.clone())?
            .connect_timeout(config.connect_timeout)
            .connect()
            .await?;
        info!(address = %config.address, "connected");
        Ok(Self::new(channel))
    }

    /// Client over an existing channel, without interceptors.
    pub fn new(channel: Channel) -> Self {
        Self {
            grpc: Grpc::new(channel),
            unary: Vec::new(),
            stream: Vec::new(),
        }
    }

    /// Append to the unary chain. Interceptors run in the order added.
    pub fn with_unary_interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: UnaryClientInterceptor<GreetRequest, GreetResponse> + 'static,
    {
        self.unary.push(Arc::new(interceptor));
        self
    }

    /// Append to the stream chain. Interceptors run in the order added.
    pub fn with_stream_interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: StreamClientInterceptor<GreetRequest, GreetResponse> + 'static,
    {
        self.stream.push(Arc::new(interceptor));
        self
    }

    /// Append to both chains.
    pub fn with_interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: UnaryClientInterceptor<GreetRequest, GreetResponse>
            + StreamClientInterceptor<GreetRequest, GreetResponse>
            + 'static,
    {
        let interceptor = Arc::new(interceptor);
        self.unary.push(interceptor.clone());
        self.stream.push(interceptor);
        self
    }

    /// Unary Greet. Header and trailer come back with the response.
    pub async fn greet(
        &self,
        options: CallOptions,
        request: GreetRequest,
    ) -> std::result::Result<UnaryResponse<GreetResponse>, Status> {
        let grpc = self.grpc.clone();
        let invoker: UnaryInvoker<GreetRequest, GreetResponse> =
            Arc::new(move |call: ClientCall, request: GreetRequest| {
                let grpc = grpc.clone();
                async move {
                    let stream = TransportClientStream::<GreetRequest, GreetResponse>::open(grpc, call)?;
                    stream.send(request).await?;
                    calls::single_response::<GreetRequest, GreetResponse>(&stream).await
                }
                .boxed()
            });
        let call = ClientCall::new(Method::Greet, options);
        UnaryClientNext::new(&self.unary, &invoker)
            .run(call, request)
            .await
    }

    /// Server-streaming GreetStream. The request is sent and half-closed
    /// before the handle is returned.
    pub async fn greet_stream(
        &self,
        options: CallOptions,
        request: GreetRequest,
    ) -> std::result::Result<ServerStreamingCall, Status> {
        let stream = self.open(Method::GreetStream, options).await?;
        stream.send(request).await?;
        stream.close_send().await?;
        Ok(ServerStreamingCall::new(stream))
    }

    /// Client-streaming CollectGreet.
    pub async fn collect_greet(
        &self,
        options: CallOptions,
    ) -> std::result::Result<ClientStreamingCall, Status> {
        let stream = self.open(Method::CollectGreet, options).await?;
        Ok(ClientStreamingCall::new(stream))
    }

    /// Bidirectional GreetChat.
    pub async fn greet_chat(&self, options: CallOptions) -> std::result::Result<BidiCall, Status> {
        let stream = self.open(Method::GreetChat, options).await?;
        Ok(BidiCall::new(stream))
    }

    async fn open(
        &self,
        method: Method,
        options: CallOptions,
    ) -> std::result::Result<BoxClientStream<GreetRequest, GreetResponse>, Status> {
        let grpc = self.grpc.clone();
        let streamer: Streamer<GreetRequest, GreetResponse> = Arc::new(move |call: ClientCall| {
            let grpc = grpc.clone();
            async move {
                let stream = TransportClientStream::<GreetRequest, GreetResponse>::open(grpc, call)?;
                Ok::<_, Status>(Box::new(stream) as BoxClientStream<GreetRequest, GreetResponse>)
            }
            .boxed()
        });
        StreamClientNext::new(&self.stream, &streamer)
            .run(ClientCall::new(method, options))
            .await
    }
}

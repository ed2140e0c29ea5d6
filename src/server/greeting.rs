//! Greeting handlers for the four call shapes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tonic::{Code, Status};
use tracing::info;

use super::config::GreetingConfig;
use super::registry::{GreetServerStream, HandlerRegistry};
use crate::context::CallContext;
use crate::metadata::Metadata;
use crate::method::Method;
use crate::proto::{DebugInfo, GreetRequest, GreetResponse};
use crate::status;
use crate::stream::ServerStream;
use crate::stream::transport::STREAM_BUFFER;

/// Server-side greeting logic.
#[derive(Debug, Clone)]
pub struct Greeter {
    stream_count: usize,
    stream_interval: Duration,
}

impl Greeter {
    pub fn new(config: &GreetingConfig) -> Self {
        Self {
            stream_count: config.stream_count,
            stream_interval: config.stream_interval(),
        }
    }

    /// Registry with all four greeter methods bound to `self`.
    pub fn into_registry(self) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        Arc::new(self).register(&mut registry);
        registry
    }

    pub fn register(self: &Arc<Self>, registry: &mut HandlerRegistry) {
        let greeter = Arc::clone(self);
        registry.unary(Method::Greet, move |ctx, request| {
            let greeter = Arc::clone(&greeter);
            async move { greeter.greet(ctx, request).await }
        });

        let greeter = Arc::clone(self);
        registry.server_streaming(Method::GreetStream, move |request, stream| {
            let greeter = Arc::clone(&greeter);
            async move { greeter.greet_stream(request, stream).await }
        });

        let greeter = Arc::clone(self);
        registry.client_streaming(Method::CollectGreet, move |stream| {
            let greeter = Arc::clone(&greeter);
            async move { greeter.collect_greet(stream).await }
        });

        let greeter = Arc::clone(self);
        registry.bidi(Method::GreetChat, move |stream| {
            let greeter = Arc::clone(&greeter);
            async move { greeter.greet_chat(stream).await }
        });
    }

    /// Unary: `"Hello, {name}!"` with header and trailer metadata.
    pub async fn greet(
        &self,
        ctx: CallContext,
        request: GreetRequest,
    ) -> Result<GreetResponse, Status> {
        info!(method = %ctx.method(), metadata = %ctx.metadata(), "incoming metadata");

        if request.name.is_empty() {
            return Err(status::with_debug_info(
                Code::InvalidArgument,
                "name must not be empty",
                DebugInfo::new("GreetRequest.name is empty"),
            ));
        }

        ctx.set_header(server_metadata("unary", "header"))?;
        let message = format!("Hello, {}!", request.name);
        ctx.set_trailer(server_metadata("unary", "trailer"));
        Ok(GreetResponse::new(message))
    }

    /// Server streaming: `stream_count` indexed greetings, paced by
    /// `stream_interval`.
    pub async fn greet_stream(
        &self,
        request: GreetRequest,
        stream: GreetServerStream,
    ) -> Result<(), Status> {
        let ctx = stream.context();
        info!(method = %ctx.method(), metadata = %ctx.metadata(), "incoming metadata");

        for i in 0..self.stream_count {
            if i > 0 {
                tokio::select! {
                    _ = ctx.cancel_token().cancelled() => {
                        return Err(Status::cancelled("call cancelled"));
                    }
                    _ = tokio::time::sleep(self.stream_interval) => {}
                }
            }
            let message = format!("[{i}] Hello, {}!", request.name);
            stream.send(GreetResponse::new(message)).await?;
        }
        Ok(())
    }

    /// Client streaming: one greeting naming everyone, in arrival order.
    pub async fn collect_greet(&self, stream: GreetServerStream) -> Result<GreetResponse, Status> {
        let ctx = stream.context();
        info!(method = %ctx.method(), metadata = %ctx.metadata(), "incoming metadata");

        let mut names = Vec::new();
        while let Some(request) = stream.recv().await? {
            names.push(request.name);
        }
        Ok(GreetResponse::new(format!("Hello, [{}]!", names.join(" "))))
    }

    /// Bidirectional: echo each greeting as it arrives.
    ///
    /// Receiving and replying run as separate loops so neither direction
    /// waits on the other.
    pub async fn greet_chat(&self, stream: GreetServerStream) -> Result<(), Status> {
        let ctx = stream.context();
        info!(method = %ctx.method(), metadata = %ctx.metadata(), "incoming metadata");

        stream.set_header(server_metadata("stream", "header"))?;

        let (tx, mut rx) = mpsc::channel::<GreetRequest>(STREAM_BUFFER);
        let inbound = Arc::clone(&stream);
        let receive = async move {
            while let Some(request) = inbound.recv().await? {
                tx.send(request)
                    .await
                    .map_err(|_| Status::internal("reply loop stopped"))?;
            }
            inbound.set_trailer(server_metadata("stream", "trailer"));
            Ok::<(), Status>(())
        };
        let reply = async {
            while let Some(request) = rx.recv().await {
                let message = format!("Hello, {}!", request.name);
                stream.send(GreetResponse::new(message)).await?;
            }
            Ok::<(), Status>(())
        };

        tokio::try_join!(receive, reply)?;
        Ok(())
    }
}

impl Default for Greeter {
    fn default() -> Self {
        Self::new(&GreetingConfig::default())
    }
}

fn server_metadata(kind: &str, place: &str) -> Metadata {
    Metadata::from_pairs([("type", kind), ("from", "server"), ("in", place)])
}

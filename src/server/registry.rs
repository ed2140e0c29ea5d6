//! Named operation handlers.
//!
//! The service dispatcher looks handlers up by [`Method`]. Adapters turn
//! plain async functions of each call shape into the two handler kinds the
//! interceptor chains understand: unary handlers and stream handlers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use tonic::Status;

use crate::context::CallContext;
use crate::interceptor::{StreamHandler, UnaryHandler};
use crate::method::{CallShape, Method};
use crate::proto::{GreetRequest, GreetResponse};
use crate::stream::{ServerStream, SharedServerStream};

/// Server stream as seen by greeter handlers.
pub type GreetServerStream = SharedServerStream<GreetRequest, GreetResponse>;

/// A registered handler.
#[derive(Clone)]
pub enum Handler {
    /// Runs through the unary interceptor chain.
    Unary(UnaryHandler<GreetRequest, GreetResponse>),
    /// Runs through the stream interceptor chain.
    Stream(StreamHandler<GreetRequest, GreetResponse>),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Unary(_) => f.write_str("Handler::Unary"),
            Handler::Stream(_) => f.write_str("Handler::Stream"),
        }
    }
}

/// Map of method → handler.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Method, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, method: Method) -> Option<&Handler> {
        self.handlers.get(&method)
    }

    pub fn contains(&self, method: Method) -> bool {
        self.handlers.contains_key(&method)
    }

    /// Registered methods in declaration order.
    pub fn methods(&self) -> Vec<Method> {
        let mut methods: Vec<_> = self.handlers.keys().copied().collect();
        methods.sort();
        methods
    }

    /// Register a handler, replacing any previous one for `method`.
    ///
    /// # Panics
    ///
    /// Panics if the handler kind does not fit the method's call shape.
    /// Registration happens once at startup, so this is a programming error.
    pub fn insert(&mut self, method: Method, handler: Handler) -> &mut Self {
        let fits = match &handler {
            Handler::Unary(_) => method.shape() == CallShape::Unary,
            Handler::Stream(_) => method.shape().is_streaming(),
        };
        assert!(fits, "{handler:?} cannot serve {method} ({:?})", method.shape());
        self.handlers.insert(method, handler);
        self
    }

    /// One request in, one response out.
    pub fn unary<F, Fut>(&mut self, method: Method, f: F) -> &mut Self
    where
        F: Fn(CallContext, GreetRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GreetResponse, Status>> + Send + 'static,
    {
        let handler: UnaryHandler<GreetRequest, GreetResponse> =
            Arc::new(move |ctx: CallContext, request: GreetRequest| f(ctx, request).boxed());
        self.insert(method, Handler::Unary(handler))
    }

    /// One request in, responses written to the stream.
    ///
    /// The request is received before `f` runs; a missing request fails
    /// the call with `InvalidArgument`.
    pub fn server_streaming<F, Fut>(&mut self, method: Method, f: F) -> &mut Self
    where
        F: Fn(GreetRequest, GreetServerStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler: StreamHandler<GreetRequest, GreetResponse> =
            Arc::new(move |stream: GreetServerStream| {
                let f = Arc::clone(&f);
                async move {
                    let request = stream
                        .recv()
                        .await?
                        .ok_or_else(|| Status::invalid_argument("missing request message"))?;
                    f(request, stream).await
                }
                .boxed()
            });
        self.insert(method, Handler::Stream(handler))
    }

    /// Requests read from the stream, one response returned.
    ///
    /// The returned response is sent after `f` completes.
    pub fn client_streaming<F, Fut>(&mut self, method: Method, f: F) -> &mut Self
    where
        F: Fn(GreetServerStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GreetResponse, Status>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler: StreamHandler<GreetRequest, GreetResponse> =
            Arc::new(move |stream: GreetServerStream| {
                let f = Arc::clone(&f);
                async move {
                    let response = f(Arc::clone(&stream)).await?;
                    stream.send(response).await
                }
                .boxed()
            });
        self.insert(method, Handler::Stream(handler))
    }

    /// Both directions driven by `f`.
    pub fn bidi<F, Fut>(&mut self, method: Method, f: F) -> &mut Self
    where
        F: Fn(GreetServerStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let handler: StreamHandler<GreetRequest, GreetResponse> =
            Arc::new(move |stream: GreetServerStream| f(stream).boxed());
        self.insert(method, Handler::Stream(handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapters_register_by_method() {
        let mut registry = HandlerRegistry::new();
        registry
            .unary(Method::Greet, |_ctx, req| async move {
                Ok(GreetResponse::new(req.name))
            })
            .bidi(Method::GreetChat, |_stream| async { Ok(()) });

        assert!(matches!(registry.get(Method::Greet), Some(Handler::Unary(_))));
        assert!(matches!(registry.get(Method::GreetChat), Some(Handler::Stream(_))));
        assert!(!registry.contains(Method::GreetStream));
        assert_eq!(registry.methods(), vec![Method::Greet, Method::GreetChat]);
    }

    #[tokio::test]
    async fn unary_adapter_calls_through() {
        let mut registry = HandlerRegistry::new();
        registry.unary(Method::Greet, |_ctx, req| async move {
            Ok(GreetResponse::new(format!("hi {}", req.name)))
        });

        let Some(Handler::Unary(handler)) = registry.get(Method::Greet) else {
            panic!("expected unary handler");
        };
        let ctx = CallContext::detached(Method::Greet, Default::default());
        let response = handler(ctx, GreetRequest::new("bob")).await.unwrap();
        assert_eq!(response.message, "hi bob");
    }

    #[test]
    #[should_panic(expected = "cannot serve")]
    fn shape_mismatch_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.bidi(Method::Greet, |_stream| async { Ok(()) });
    }
}

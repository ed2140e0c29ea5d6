//! Stream decorators.
//!
//! An interceptor that needs to see individual messages wraps the stream
//! object it was given and passes the wrapper down the chain. The wrapper
//! calls [`StreamHooks::on_recv`] after the inner stream returns a message
//! and [`StreamHooks::on_send`] before a message is handed to the inner
//! stream. Every other operation is forwarded untouched.
//!
//! Because each interceptor wraps the stream produced by the one before
//! it, inbound hooks run outermost-first and outbound hooks run
//! innermost-first.

use std::marker::PhantomData;

use async_trait::async_trait;
use tonic::Status;

use super::{BoxClientStream, CallState, ClientStream, Payload, ServerStream, SharedServerStream};
use crate::client::ClientCall;
use crate::context::CallContext;
use crate::metadata::Metadata;

/// Per-message observers.
///
/// `In` is the type received on the wrapped side, `Out` the type sent.
/// Hooks observe; they cannot alter or drop messages. The sentinel is
/// reported through `on_end`, never as a message.
pub trait StreamHooks<In, Out>: Send + Sync + 'static {
    fn on_recv(&self, _message: &In) {}

    fn on_send(&self, _message: &Out) {}

    /// The inbound side reached the end-of-stream sentinel.
    fn on_end(&self) {}

    /// A receive or send failed.
    fn on_error(&self, _status: &Status) {}
}

/// Server stream that reports every message to `H`.
pub struct ServerStreamWrapper<Req, Res, H> {
    inner: SharedServerStream<Req, Res>,
    hooks: H,
    _types: PhantomData<fn(Req) -> Res>,
}

impl<Req, Res, H> ServerStreamWrapper<Req, Res, H>
where
    Req: Payload,
    Res: Payload,
    H: StreamHooks<Req, Res>,
{
    pub fn new(inner: SharedServerStream<Req, Res>, hooks: H) -> Self {
        Self {
            inner,
            hooks,
            _types: PhantomData,
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }
}

#[async_trait]
impl<Req, Res, H> ServerStream<Req, Res> for ServerStreamWrapper<Req, Res, H>
where
    Req: Payload,
    Res: Payload,
    H: StreamHooks<Req, Res>,
{
    fn context(&self) -> &CallContext {
        self.inner.context()
    }

    async fn recv(&self) -> Result<Option<Req>, Status> {
        let received = self.inner.recv().await;
        match &received {
            Ok(Some(message)) => self.hooks.on_recv(message),
            Ok(None) => self.hooks.on_end(),
            Err(status) => self.hooks.on_error(status),
        }
        received
    }

    async fn send(&self, message: Res) -> Result<(), Status> {
        self.hooks.on_send(&message);
        let sent = self.inner.send(message).await;
        if let Err(status) = &sent {
            self.hooks.on_error(status);
        }
        sent
    }

    fn set_header(&self, md: Metadata) -> Result<(), Status> {
        self.inner.set_header(md)
    }

    fn send_header(&self) -> Result<(), Status> {
        self.inner.send_header()
    }

    fn set_trailer(&self, md: Metadata) {
        self.inner.set_trailer(md)
    }
}

/// Client stream that reports every message to `H`.
///
/// On the client the received type is the response, so the hooks are
/// `StreamHooks<Res, Req>`.
pub struct ClientStreamWrapper<Req, Res, H> {
    inner: BoxClientStream<Req, Res>,
    hooks: H,
}

impl<Req, Res, H> ClientStreamWrapper<Req, Res, H>
where
    Req: Payload,
    Res: Payload,
    H: StreamHooks<Res, Req>,
{
    pub fn new(inner: BoxClientStream<Req, Res>, hooks: H) -> Self {
        Self { inner, hooks }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }
}

#[async_trait]
impl<Req, Res, H> ClientStream<Req, Res> for ClientStreamWrapper<Req, Res, H>
where
    Req: Payload,
    Res: Payload,
    H: StreamHooks<Res, Req>,
{
    fn call(&self) -> &ClientCall {
        self.inner.call()
    }

    async fn send(&self, message: Req) -> Result<(), Status> {
        self.hooks.on_send(&message);
        let sent = self.inner.send(message).await;
        if let Err(status) = &sent {
            self.hooks.on_error(status);
        }
        sent
    }

    async fn close_send(&self) -> Result<(), Status> {
        self.inner.close_send().await
    }

    async fn recv(&self) -> Result<Option<Res>, Status> {
        let received = self.inner.recv().await;
        match &received {
            Ok(Some(message)) => self.hooks.on_recv(message),
            Ok(None) => self.hooks.on_end(),
            Err(status) => self.hooks.on_error(status),
        }
        received
    }

    async fn header(&self) -> Result<Metadata, Status> {
        self.inner.header().await
    }

    fn trailer(&self) -> Option<Metadata> {
        self.inner.trailer()
    }

    fn state(&self) -> CallState {
        self.inner.state()
    }
}

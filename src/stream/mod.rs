//! Message streams.
//!
//! Every call, whatever its shape, is driven through a stream object.
//! [`ServerStream`] is the handler's view of a call and [`ClientStream`]
//! the caller's. Both take `&self` everywhere so one task can send while
//! another receives.
//!
//! End of stream is the `Ok(None)` sentinel from `recv`. It is returned
//! again on every later `recv` and is never an error.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tonic::Status;

use crate::client::ClientCall;
use crate::context::CallContext;
use crate::metadata::Metadata;

pub mod transport;
pub mod wrapper;

pub use transport::{TransportClientStream, TransportServerStream};
pub use wrapper::{ClientStreamWrapper, ServerStreamWrapper, StreamHooks};

/// Bound shared by every message type carried on a stream.
pub trait Payload: Debug + Send + Sync + 'static {}

impl<T: Debug + Send + Sync + 'static> Payload for T {}

/// Lifecycle of a client call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    /// Opened locally; the server has not answered yet.
    Created,
    /// Response headers received; messages may flow.
    Active,
    /// Ended with the sentinel and an OK status.
    Completed,
    /// Ended with an error status.
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Completed | CallState::Failed)
    }
}

/// Server half of a call.
#[async_trait]
pub trait ServerStream<Req, Res>: Send + Sync {
    fn context(&self) -> &CallContext;

    /// Next request, or `Ok(None)` once the client half-closed.
    async fn recv(&self) -> Result<Option<Req>, Status>;

    /// Send a response. Flushes the header first if still pending.
    async fn send(&self, message: Res) -> Result<(), Status>;

    fn set_header(&self, md: Metadata) -> Result<(), Status>;

    fn send_header(&self) -> Result<(), Status>;

    fn set_trailer(&self, md: Metadata);
}

/// Client half of a call.
#[async_trait]
pub trait ClientStream<Req, Res>: Send + Sync {
    fn call(&self) -> &ClientCall;

    async fn send(&self, message: Req) -> Result<(), Status>;

    /// Half-close: no more requests will be sent. Idempotent.
    async fn close_send(&self) -> Result<(), Status>;

    /// Next response, or `Ok(None)` once the server finished with OK.
    async fn recv(&self) -> Result<Option<Res>, Status>;

    /// Response header, waiting for it if needed.
    async fn header(&self) -> Result<Metadata, Status>;

    /// Response trailer. `None` until `recv` has returned the sentinel or
    /// an error.
    fn trailer(&self) -> Option<Metadata>;

    fn state(&self) -> CallState;
}

/// Server stream as handed to interceptors and handlers.
pub type SharedServerStream<Req, Res> = Arc<dyn ServerStream<Req, Res>>;

/// Client stream as returned by the stream interceptor chain.
pub type BoxClientStream<Req, Res> = Box<dyn ClientStream<Req, Res>>;

//! Typed handles for in-flight streaming calls.
//!
//! Each handle exposes only the operations its call shape allows. All of
//! them sit on top of the stream returned by the client interceptor chain,
//! so wrapped streams observe every message.

use tonic::Status;

use super::UnaryResponse;
use crate::metadata::Metadata;
use crate::proto::{GreetRequest, GreetResponse};
use crate::stream::{BoxClientStream, CallState, ClientStream, Payload};

/// Client stream as seen by the typed call handles.
pub type GreetClientStream = BoxClientStream<GreetRequest, GreetResponse>;

/// Half-close `stream` and read exactly one response, then the end of the
/// call.
pub(crate) async fn single_response<Req, Res>(
    stream: &dyn ClientStream<Req, Res>,
) -> Result<UnaryResponse<Res>, Status>
where
    Req: Payload,
    Res: Payload,
{
    stream.close_send().await?;
    let header = stream.header().await?;
    let message = stream
        .recv()
        .await?
        .ok_or_else(|| Status::internal("server closed the call without a response"))?;
    if stream.recv().await?.is_some() {
        return Err(Status::internal("server sent more than one response"));
    }
    Ok(UnaryResponse {
        header,
        message,
        trailer: stream.trailer().unwrap_or_default(),
    })
}

/// A GreetStream call: the request is sent, responses are read until the
/// sentinel.
pub struct ServerStreamingCall {
    stream: GreetClientStream,
}

impl ServerStreamingCall {
    pub(crate) fn new(stream: GreetClientStream) -> Self {
        Self { stream }
    }

    /// Next response, or `Ok(None)` once the server finished.
    pub async fn message(&self) -> Result<Option<GreetResponse>, Status> {
        self.stream.recv().await
    }

    pub async fn header(&self) -> Result<Metadata, Status> {
        self.stream.header().await
    }

    pub fn trailer(&self) -> Option<Metadata> {
        self.stream.trailer()
    }

    pub fn state(&self) -> CallState {
        self.stream.state()
    }

    pub fn cancel(&self) {
        self.stream.call().cancel();
    }
}

/// A CollectGreet call: requests are sent, then one response is read.
pub struct ClientStreamingCall {
    stream: GreetClientStream,
}

impl ClientStreamingCall {
    pub(crate) fn new(stream: GreetClientStream) -> Self {
        Self { stream }
    }

    pub async fn send(&self, request: GreetRequest) -> Result<(), Status> {
        self.stream.send(request).await
    }

    /// Half-close and wait for the aggregated response.
    pub async fn close_and_recv(&self) -> Result<UnaryResponse<GreetResponse>, Status> {
        single_response(&*self.stream).await
    }

    pub fn state(&self) -> CallState {
        self.stream.state()
    }

    pub fn cancel(&self) {
        self.stream.call().cancel();
    }
}

/// A GreetChat call. Sending and receiving may run on separate tasks.
pub struct BidiCall {
    stream: GreetClientStream,
}

impl BidiCall {
    pub(crate) fn new(stream: GreetClientStream) -> Self {
        Self { stream }
    }

    pub async fn send(&self, request: GreetRequest) -> Result<(), Status> {
        self.stream.send(request).await
    }

    /// No more requests. Responses keep flowing until the server ends.
    pub async fn close_send(&self) -> Result<(), Status> {
        self.stream.close_send().await
    }

    pub async fn message(&self) -> Result<Option<GreetResponse>, Status> {
        self.stream.recv().await
    }

    pub async fn header(&self) -> Result<Metadata, Status> {
        self.stream.header().await
    }

    /// Available once `message` returned `Ok(None)` or an error.
    pub fn trailer(&self) -> Option<Metadata> {
        self.stream.trailer()
    }

    pub fn state(&self) -> CallState {
        self.stream.state()
    }

    pub fn cancel(&self) {
        self.stream.call().cancel();
    }
}

//! Streams backed by the HTTP/2 transport.
//!
//! Every method uses gRPC streaming framing on the wire, so both sides of
//! every call are one of these two types. Call shapes are enforced above
//! this layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{Code, Status};
use tracing::{debug, warn};

use super::{CallState, ClientStream, Payload, ServerStream};
use crate::client::ClientCall;
use crate::context::CallContext;
use crate::metadata::Metadata;

/// Messages buffered per direction before `send` waits for the peer.
pub const STREAM_BUFFER: usize = 16;

/// Inbound request messages as decoded by tonic.
pub type Inbound<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// Outbound response items. The final item is always `Err(status)`; an
/// OK-coded status carries the trailer.
pub type Outbound<T> = mpsc::Sender<Result<T, Status>>;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Handler-side stream over a decoded request body and a response channel.
pub struct TransportServerStream<Req, Res> {
    ctx: CallContext,
    inbound: tokio::sync::Mutex<ServerInbound<Req>>,
    outbound: Outbound<Res>,
}

struct ServerInbound<Req> {
    stream: Inbound<Req>,
    finished: bool,
}

impl<Req: Payload, Res: Payload> TransportServerStream<Req, Res> {
    pub fn new(ctx: CallContext, inbound: Inbound<Req>, outbound: Outbound<Res>) -> Self {
        Self {
            ctx,
            inbound: tokio::sync::Mutex::new(ServerInbound {
                stream: inbound,
                finished: false,
            }),
            outbound,
        }
    }

    /// End the response stream with `result`.
    ///
    /// Flushes the header if nothing flushed it yet, then emits the final
    /// status with the trailer attached.
    pub async fn finish(&self, result: Result<(), Status>) {
        self.ctx.flush_header();
        let trailer = self.ctx.take_trailer();
        let end = match result {
            Ok(()) => match trailer.to_metadata_map() {
                Ok(map) => Status::with_metadata(Code::Ok, "", map),
                Err(e) => Status::from(e),
            },
            Err(mut status) => {
                if let Err(e) = trailer.write_into(status.metadata_mut()) {
                    warn!(method = %self.ctx.method(), error = %e, "dropping invalid trailer");
                }
                status
            }
        };
        if self.outbound.send(Err(end)).await.is_err() {
            debug!(method = %self.ctx.method(), "response stream already closed");
        }
    }
}

#[async_trait]
impl<Req: Payload, Res: Payload> ServerStream<Req, Res> for TransportServerStream<Req, Res> {
    fn context(&self) -> &CallContext {
        &self.ctx
    }

    async fn recv(&self) -> Result<Option<Req>, Status> {
        let mut inbound = self.inbound.lock().await;
        if inbound.finished {
            return Ok(None);
        }
        let next = tokio::select! {
            biased;
            _ = self.ctx.cancel_token().cancelled() => {
                return Err(Status::cancelled("call cancelled"));
            }
            next = inbound.stream.next() => next,
        };
        match next {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(status)) => Err(status),
            None => {
                inbound.finished = true;
                Ok(None)
            }
        }
    }

    async fn send(&self, message: Res) -> Result<(), Status> {
        self.ctx.flush_header();
        tokio::select! {
            biased;
            _ = self.ctx.cancel_token().cancelled() => Err(Status::cancelled("call cancelled")),
            sent = self.outbound.send(Ok(message)) => {
                sent.map_err(|_| Status::cancelled("client closed the response stream"))
            }
        }
    }

    fn set_header(&self, md: Metadata) -> Result<(), Status> {
        self.ctx.set_header(md)
    }

    fn send_header(&self) -> Result<(), Status> {
        self.ctx.send_header()
    }

    fn set_trailer(&self, md: Metadata) {
        self.ctx.set_trailer(md)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

type HeaderSlot = watch::Receiver<Option<Result<Metadata, Status>>>;

/// Caller-side stream over a tonic channel.
///
/// The request future runs on its own task so that requests can be sent
/// before the server answers with headers.
pub struct TransportClientStream<Req, Res> {
    call: ClientCall,
    deadline: Option<Instant>,
    outbound: Mutex<Option<mpsc::Sender<Req>>>,
    inbound: tokio::sync::Mutex<ClientInbound<Res>>,
    header: HeaderSlot,
    trailer: OnceLock<Metadata>,
    state: Mutex<CallState>,
}

enum ClientInbound<Res> {
    Pending(JoinHandle<Result<Streaming<Res>, Status>>),
    Open(Streaming<Res>),
    Finished,
    Failed(Status),
}

impl<Req, Res> TransportClientStream<Req, Res>
where
    Req: Payload + prost::Message,
    Res: Payload + prost::Message + Default,
{
    /// Start `call` on `grpc`. Must be called within a tokio runtime.
    pub fn open(mut grpc: Grpc<Channel>, call: ClientCall) -> Result<Self, Status> {
        let (outbound, rx) = mpsc::channel(STREAM_BUFFER);
        let mut request = tonic::Request::new(ReceiverStream::new(rx));
        call.metadata()
            .write_into(request.metadata_mut())
            .map_err(Status::from)?;
        if let Some(timeout) = call.timeout() {
            request.set_timeout(timeout);
        }
        let path = PathAndQuery::from_static(call.method().path());

        let (header_tx, header) = watch::channel(None);
        let task = tokio::spawn(async move {
            let response: Result<tonic::Response<Streaming<Res>>, Status> = async {
                grpc.ready()
                    .await
                    .map_err(|e| Status::unavailable(format!("service was not ready: {e}")))?;
                grpc.streaming(request, path, ProstCodec::<Req, Res>::default())
                    .await
            }
            .await;
            match response {
                Ok(response) => {
                    let (metadata, streaming, _) = response.into_parts();
                    header_tx.send_replace(Some(Ok(Metadata::from_metadata_map(&metadata))));
                    Ok(streaming)
                }
                Err(status) => {
                    header_tx.send_replace(Some(Err(status.clone())));
                    Err(status)
                }
            }
        });

        Ok(Self {
            deadline: call.timeout().map(|t| Instant::now() + t),
            call,
            outbound: Mutex::new(Some(outbound)),
            inbound: tokio::sync::Mutex::new(ClientInbound::Pending(task)),
            header,
            trailer: OnceLock::new(),
            state: Mutex::new(CallState::Created),
        })
    }
}

impl<Req, Res> TransportClientStream<Req, Res> {
    /// Run `fut` unless the call is cancelled or its deadline passes first.
    async fn guarded<T>(&self, fut: impl Future<Output = Result<T, Status>>) -> Result<T, Status> {
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.call.cancel_token().cancelled() => Err(Status::cancelled("call cancelled")),
            _ = expired => Err(Status::deadline_exceeded("deadline exceeded")),
            result = fut => result,
        }
    }

    fn state_guard(&self) -> MutexGuard<'_, CallState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move to `next` unless the call already ended.
    fn advance(&self, next: CallState) {
        let mut state = self.state_guard();
        if !state.is_terminal() {
            *state = next;
        }
    }

    fn fail(&self, inbound: &mut ClientInbound<Res>, status: &Status) {
        if let ClientInbound::Pending(task) = &*inbound {
            task.abort();
        }
        let _ = self.trailer.set(Metadata::from_metadata_map(status.metadata()));
        *inbound = ClientInbound::Failed(status.clone());
        self.advance(CallState::Failed);
    }
}

#[async_trait]
impl<Req: Payload, Res: Payload> ClientStream<Req, Res> for TransportClientStream<Req, Res> {
    fn call(&self) -> &ClientCall {
        &self.call
    }

    async fn send(&self, message: Req) -> Result<(), Status> {
        let sender = self
            .outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| Status::failed_precondition("send after close_send"))?;
        self.guarded(async move {
            sender
                .send(message)
                .await
                .map_err(|_| Status::unavailable("request stream closed by the server"))
        })
        .await
    }

    async fn close_send(&self) -> Result<(), Status> {
        self.outbound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Res>, Status> {
        let mut inbound = self.inbound.lock().await;
        loop {
            match &mut *inbound {
                ClientInbound::Pending(task) => {
                    let opened = self
                        .guarded(async {
                            task.await.map_err(|e| {
                                Status::internal(format!("call task failed: {e}"))
                            })?
                        })
                        .await;
                    match opened {
                        Ok(streaming) => {
                            *inbound = ClientInbound::Open(streaming);
                            self.advance(CallState::Active);
                        }
                        Err(status) => {
                            self.fail(&mut inbound, &status);
                            return Err(status);
                        }
                    }
                }
                ClientInbound::Open(streaming) => {
                    let status = match self.guarded(streaming.message()).await {
                        Ok(Some(message)) => return Ok(Some(message)),
                        Ok(None) => match streaming.trailers().await {
                            Ok(trailer) => {
                                let trailer = trailer
                                    .map(|map| Metadata::from_metadata_map(&map))
                                    .unwrap_or_default();
                                let _ = self.trailer.set(trailer);
                                *inbound = ClientInbound::Finished;
                                self.advance(CallState::Completed);
                                return Ok(None);
                            }
                            Err(status) => status,
                        },
                        Err(status) => status,
                    };
                    self.fail(&mut inbound, &status);
                    return Err(status);
                }
                ClientInbound::Finished => return Ok(None),
                ClientInbound::Failed(status) => return Err(status.clone()),
            }
        }
    }

    async fn header(&self) -> Result<Metadata, Status> {
        let mut header = self.header.clone();
        let result = self
            .guarded(async move {
                let slot = header
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| Status::internal("call task ended without a response"))?;
                match &*slot {
                    Some(Ok(md)) => Ok(md.clone()),
                    Some(Err(status)) => Err(status.clone()),
                    None => Err(Status::internal("response header missing")),
                }
            })
            .await;
        match &result {
            Ok(_) => self.advance(CallState::Active),
            Err(_) => self.advance(CallState::Failed),
        }
        result
    }

    fn trailer(&self) -> Option<Metadata> {
        self.trailer.get().cloned()
    }

    fn state(&self) -> CallState {
        *self.state_guard()
    }
}

impl<Req, Res> Drop for TransportClientStream<Req, Res> {
    fn drop(&mut self) {
        if let ClientInbound::Pending(task) = self.inbound.get_mut() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::stream;
    use tokio::sync::oneshot;

    use super::*;
    use crate::method::Method;
    use crate::proto::{GreetRequest, GreetResponse};

    type Pipe = (
        Arc<TransportServerStream<GreetRequest, GreetResponse>>,
        mpsc::Receiver<Result<GreetResponse, Status>>,
        oneshot::Receiver<Metadata>,
    );

    fn pipe(requests: Vec<Result<GreetRequest, Status>>) -> Pipe {
        let (flush, header) = oneshot::channel();
        let ctx = CallContext::new(Method::GreetChat, Metadata::new(), None, flush);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let stream = TransportServerStream::new(ctx, Box::pin(stream::iter(requests)), tx);
        (Arc::new(stream), rx, header)
    }

    #[tokio::test]
    async fn recv_returns_sentinel_repeatedly() {
        let (stream, _rx, _header) = pipe(vec![Ok(GreetRequest::new("alice"))]);

        assert_eq!(stream.recv().await.unwrap().unwrap().name, "alice");
        assert!(stream.recv().await.unwrap().is_none());
        assert!(stream.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recv_forwards_errors_verbatim() {
        let (stream, _rx, _header) = pipe(vec![Err(Status::data_loss("torn frame"))]);

        let err = stream.recv().await.unwrap_err();
        assert_eq!(err.code(), Code::DataLoss);
        assert_eq!(err.message(), "torn frame");
    }

    #[tokio::test]
    async fn first_send_flushes_header() {
        let (stream, mut rx, header) = pipe(vec![]);
        stream
            .set_header(Metadata::from_pairs([("in", "header")]))
            .unwrap();

        stream.send(GreetResponse::new("hi")).await.unwrap();

        assert_eq!(header.await.unwrap().get("in"), Some("header"));
        assert_eq!(rx.recv().await.unwrap().unwrap().message, "hi");
        assert!(stream.set_header(Metadata::new()).is_err());
    }

    #[tokio::test]
    async fn finish_emits_trailer_as_ok_status() {
        let (stream, mut rx, header) = pipe(vec![]);
        stream.set_trailer(Metadata::from_pairs([("in", "trailer")]));

        stream.finish(Ok(())).await;

        assert!(header.await.unwrap().is_empty());
        let end = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(end.code(), Code::Ok);
        assert_eq!(
            end.metadata().get("in").and_then(|v| v.to_str().ok()),
            Some("trailer")
        );
    }

    #[tokio::test]
    async fn finish_attaches_trailer_to_errors() {
        let (stream, mut rx, _header) = pipe(vec![]);
        stream.set_trailer(Metadata::from_pairs([("from", "server")]));

        stream.finish(Err(Status::not_found("nobody"))).await;

        let end = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(end.code(), Code::NotFound);
        assert!(end.metadata().get("from").is_some());
    }

    #[tokio::test]
    async fn cancelled_call_interrupts_recv_and_send() {
        let (flush, _header) = oneshot::channel();
        let ctx = CallContext::new(Method::GreetChat, Metadata::new(), None, flush);
        let (tx, _rx) = mpsc::channel(1);
        let stream: TransportServerStream<GreetRequest, GreetResponse> =
            TransportServerStream::new(
                ctx.clone(),
                Box::pin(stream::pending::<Result<GreetRequest, Status>>()),
                tx,
            );

        ctx.cancel_token().cancel();

        assert_eq!(stream.recv().await.unwrap_err().code(), Code::Cancelled);
        assert_eq!(
            stream.send(GreetResponse::new("late")).await.unwrap_err().code(),
            Code::Cancelled
        );
    }

    #[tokio::test]
    async fn failing_while_opening_aborts_the_request_task() {
        // Accepts connections but never answers, so the call stays opening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        let channel = tonic::transport::Endpoint::from_shared(format!("http://{addr}"))
            .unwrap()
            .connect_lazy();

        let call = crate::client::ClientCall::new(
            Method::GreetChat,
            crate::client::CallOptions::new(),
        );
        let stream =
            TransportClientStream::<GreetRequest, GreetResponse>::open(Grpc::new(channel), call)
                .unwrap();

        stream.call().cancel();
        assert_eq!(stream.recv().await.unwrap_err().code(), Code::Cancelled);
        assert_eq!(stream.state(), CallState::Failed);

        // The header sender lives in the request task and drops with it.
        let mut header = stream.header.clone();
        tokio::time::timeout(std::time::Duration::from_secs(1), header.changed())
            .await
            .expect("request task should be aborted")
            .unwrap_err();
    }
}

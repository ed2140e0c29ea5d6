//! Server-side call context.
//!
//! A [`CallContext`] is created per call by the service dispatcher and
//! shared by everything that takes part in that call: interceptors, the
//! stream object and the handler. Cloning is cheap.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio::time::Instant;
use tonic::Status;

use crate::cancel::CancelToken;
use crate::metadata::Metadata;
use crate::method::Method;

/// Per-call state visible to server handlers and interceptors.
#[derive(Debug, Clone)]
pub struct CallContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    method: Method,
    incoming: Metadata,
    cancel: CancelToken,
    deadline: Option<Instant>,
    outgoing: Mutex<Outgoing>,
}

#[derive(Debug, Default)]
struct Outgoing {
    header: Metadata,
    trailer: Metadata,
    // `None` once the header has been flushed.
    flush: Option<oneshot::Sender<Metadata>>,
}

impl CallContext {
    /// Create a context whose header is delivered through `flush` when the
    /// call flushes it.
    pub fn new(
        method: Method,
        incoming: Metadata,
        deadline: Option<Instant>,
        flush: oneshot::Sender<Metadata>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                method,
                incoming,
                cancel: CancelToken::new(),
                deadline,
                outgoing: Mutex::new(Outgoing {
                    flush: Some(flush),
                    ..Default::default()
                }),
            }),
        }
    }

    /// Context detached from any transport. Flushed headers are discarded.
    pub fn detached(method: Method, incoming: Metadata) -> Self {
        let (flush, _) = oneshot::channel();
        Self::new(method, incoming, None, flush)
    }

    pub fn method(&self) -> Method {
        self.inner.method
    }

    /// Metadata the client sent as request headers.
    pub fn metadata(&self) -> &Metadata {
        &self.inner.incoming
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Merge `md` into the pending response header.
    ///
    /// Fails with `Internal` once the header has been flushed.
    pub fn set_header(&self, md: Metadata) -> Result<(), Status> {
        let mut outgoing = self.outgoing();
        if outgoing.flush.is_none() {
            return Err(Status::internal("header already sent"));
        }
        outgoing.header.merge(md);
        Ok(())
    }

    /// Flush the pending header now.
    ///
    /// Fails with `Internal` if it was already flushed.
    pub fn send_header(&self) -> Result<(), Status> {
        if self.flush_header() {
            Ok(())
        } else {
            Err(Status::internal("header already sent"))
        }
    }

    /// Flush the pending header if it has not been flushed yet.
    ///
    /// Returns `true` if this call performed the flush.
    pub fn flush_header(&self) -> bool {
        let mut outgoing = self.outgoing();
        let Some(flush) = outgoing.flush.take() else {
            return false;
        };
        let header = std::mem::take(&mut outgoing.header);
        // The receiver is gone when the call was abandoned.
        let _ = flush.send(header);
        true
    }

    pub fn header_sent(&self) -> bool {
        self.outgoing().flush.is_none()
    }

    /// Merge `md` into the trailer sent when the call finishes.
    pub fn set_trailer(&self, md: Metadata) {
        self.outgoing().trailer.merge(md);
    }

    /// Take the accumulated trailer, leaving it empty.
    pub fn take_trailer(&self) -> Metadata {
        std::mem::take(&mut self.outgoing().trailer)
    }

    fn outgoing(&self) -> MutexGuard<'_, Outgoing> {
        // Outgoing is plain data; a poisoned lock still holds a usable value.
        self.inner
            .outgoing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> (CallContext, oneshot::Receiver<Metadata>) {
        let (tx, rx) = oneshot::channel();
        let ctx = CallContext::new(
            Method::Greet,
            Metadata::from_pairs([("from", "client")]),
            None,
            tx,
        );
        (ctx, rx)
    }

    #[tokio::test]
    async fn header_is_flushed_once() {
        let (ctx, rx) = context();
        ctx.set_header(Metadata::from_pairs([("in", "header")]))
            .unwrap();
        assert!(!ctx.header_sent());

        assert!(ctx.flush_header());
        assert!(!ctx.flush_header());
        assert!(ctx.header_sent());

        let header = rx.await.unwrap();
        assert_eq!(header.get("in"), Some("header"));
    }

    #[test]
    fn set_header_after_flush_is_internal() {
        let (ctx, _rx) = context();
        ctx.send_header().unwrap();

        let err = ctx
            .set_header(Metadata::from_pairs([("late", "yes")]))
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Internal);
        assert_eq!(ctx.send_header().unwrap_err().code(), tonic::Code::Internal);
    }

    #[test]
    fn trailer_accumulates_and_is_taken() {
        let (ctx, _rx) = context();
        ctx.set_trailer(Metadata::from_pairs([("in", "trailer")]));
        ctx.set_trailer(Metadata::from_pairs([("from", "server")]));

        let trailer = ctx.take_trailer();
        assert_eq!(trailer.len(), 2);
        assert!(ctx.take_trailer().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let (ctx, _rx) = context();
        let other = ctx.clone();
        other.cancel_token().cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.metadata().get("from"), Some("client"));
        assert_eq!(ctx.method(), Method::Greet);
    }
}

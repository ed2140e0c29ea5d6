//! Listener setup and graceful shutdown.
//!
//! Shutdown is driven by a [`CancelToken`]. Once it fires the accept loop
//! drops the listener, tonic drains open connections, and [`serve`] waits
//! until every in-flight call has finished.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::Stream;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tonic::transport::Server;
use tracing::{debug, info, warn};

use super::service::GreeterServer;
use crate::cancel::CancelToken;
use crate::proto::FILE_DESCRIPTOR_SET;
use crate::Result;

/// Count of calls currently being handled.
#[derive(Debug, Clone)]
pub struct ActiveCalls {
    tx: Arc<watch::Sender<usize>>,
}

impl ActiveCalls {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Register a call. It counts as active until the guard is dropped.
    pub fn track(&self) -> CallGuard {
        self.tx.send_modify(|n| *n += 1);
        CallGuard {
            tx: Arc::clone(&self.tx),
        }
    }

    pub fn count(&self) -> usize {
        *self.tx.borrow()
    }

    /// Resolve once no call is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for ActiveCalls {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps one call counted in [`ActiveCalls`].
#[derive(Debug)]
pub struct CallGuard {
    tx: Arc<watch::Sender<usize>>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Bind the server socket.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Accepted connections until `shutdown` fires.
///
/// On shutdown the listener is dropped, so later connection attempts are
/// refused, and only then is `closed` triggered and the stream ended.
fn accept_until(
    listener: TcpListener,
    shutdown: CancelToken,
    closed: CancelToken,
) -> impl Stream<Item = io::Result<TcpStream>> + Send {
    futures_util::stream::unfold(listener, move |listener| {
        let shutdown = shutdown.clone();
        let closed = closed.clone();
        async move {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                accepted = listener.accept() => Some(accepted),
            };
            let Some(accepted) = accepted else {
                drop(listener);
                debug!("listener closed");
                closed.cancel();
                return None;
            };
            let accepted = match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection accepted");
                    Ok(stream)
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    Err(e)
                }
            };
            Some((accepted, listener))
        }
    })
}

/// Serve `server` on `listener` until `shutdown` fires and all calls end.
///
/// The gRPC reflection service (`grpc.reflection.v1`) is hosted alongside
/// so tools such as `grpcurl` can discover `greeter.v1.Greeter`.
///
/// Open connections are drained by tonic once the listener is closed; the
/// call count is awaited after that so no in-flight call is cut short.
pub async fn serve(listener: TcpListener, server: GreeterServer, shutdown: CancelToken) -> Result<()> {
    let active = server.active_calls().clone();
    let limit = server.limits().max_concurrent_requests;
    let closed = CancelToken::new();
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;
    let incoming = Box::pin(accept_until(listener, shutdown, closed.clone()));

    Server::builder()
        .concurrency_limit_per_connection(limit)
        .add_service(server)
        .add_service(reflection)
        .serve_with_incoming_shutdown(incoming, async move { closed.cancelled().await })
        .await?;

    if active.count() > 0 {
        info!(calls = active.count(), "waiting for in-flight calls");
    }
    active.wait_idle().await;
    info!("server stopped");
    Ok(())
}

/// Cancel `shutdown` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(shutdown: CancelToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn guards_drive_the_count() {
        let active = ActiveCalls::new();
        let first = active.track();
        let second = active.track();
        assert_eq!(active.count(), 2);

        drop(first);
        assert_eq!(active.count(), 1);

        let waiter = {
            let active = active.clone();
            tokio::spawn(async move { active.wait_idle().await })
        };
        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("idle after last guard")
            .unwrap();
    }

    #[tokio::test]
    async fn accept_stream_ends_on_shutdown() {
        use futures_util::StreamExt;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancelToken::new();
        let closed = CancelToken::new();
        let mut incoming = Box::pin(accept_until(listener, shutdown.clone(), closed.clone()));

        let _client = TcpStream::connect(addr).await.unwrap();
        assert!(incoming.next().await.unwrap().is_ok());

        shutdown.cancel();
        assert!(incoming.next().await.is_none());
        assert!(closed.is_cancelled());
        assert!(TcpStream::connect(addr).await.is_err());
    }
}

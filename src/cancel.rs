//! Cooperative cancellation.
//!
//! [`CancelToken`] is a cloneable, trigger-once flag backed by a
//! `tokio::sync::watch` channel. It serves both as the per-call
//! cancellation signal and as the server's shutdown token.

use std::sync::Arc;

use tokio::sync::watch;

/// Trigger-once cancellation signal shared by clones.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger cancellation. Later calls are no-ops.
    pub fn cancel(&self) {
        self.tx.send_if_modified(|cancelled| {
            let changed = !*cancelled;
            *cancelled = true;
            changed
        });
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation is requested (immediately if it already was).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives inside `self`, so `wait_for` can only end by
        // observing `true`.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-call client state.

use std::time::Duration;

use crate::cancel::CancelToken;
use crate::metadata::Metadata;
use crate::method::Method;

/// Caller-supplied options for a single call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    metadata: Metadata,
    timeout: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outgoing metadata, sent as request headers.
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Deadline relative to the start of the call. Sent as `grpc-timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Cancel the call when `token` fires.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A call being set up or in flight, as seen by client interceptors.
///
/// Interceptors may change the outgoing metadata before passing the call
/// on; changes after the call has started have no effect on the wire.
#[derive(Debug, Clone)]
pub struct ClientCall {
    method: Method,
    metadata: Metadata,
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl ClientCall {
    pub fn new(method: Method, options: CallOptions) -> Self {
        Self {
            method,
            metadata: options.metadata,
            timeout: options.timeout,
            cancel: options.cancel.unwrap_or_default(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Abandon the call. Pending and later operations fail with `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Result of a unary call: the response with its metadata.
#[derive(Debug, Clone)]
pub struct UnaryResponse<Res> {
    pub header: Metadata,
    pub message: Res,
    pub trailer: Metadata,
}

impl<Res> UnaryResponse<Res> {
    pub fn into_message(self) -> Res {
        self.message
    }
}

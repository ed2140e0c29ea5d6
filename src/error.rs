//! Greeter error types

/// Greeter error types
#[derive(Debug, thiserror::Error)]
pub enum GreeterError {
    // Transport errors
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A call finished with a non-OK status.
    #[error("rpc failed: {}", .0.message())]
    Status(#[from] tonic::Status),

    // Data errors
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "server")]
    #[error("reflection error: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
}

impl GreeterError {
    /// The underlying call status, if this error came from a call.
    pub fn status(&self) -> Option<&tonic::Status> {
        match self {
            GreeterError::Status(status) => Some(status),
            _ => None,
        }
    }
}

impl From<GreeterError> for tonic::Status {
    fn from(err: GreeterError) -> Self {
        match err {
            GreeterError::Status(status) => status,
            GreeterError::InvalidMetadata(msg) => tonic::Status::internal(msg),
            GreeterError::Transport(e) => tonic::Status::unavailable(e.to_string()),
            other => tonic::Status::unknown(other.to_string()),
        }
    }
}

/// Result type alias for Greeter operations
pub type Result<T> = std::result::Result<T, GreeterError>;

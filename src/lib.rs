//! Greeter - gRPC greeting service with composable interceptors
//!
//! This crate serves and calls `greeter.v1.Greeter`, a service exposing the
//! four gRPC call shapes (unary, server streaming, client streaming and
//! bidirectional streaming). Calls carry header and trailer metadata and
//! run through interceptor chains on both sides.
//!
//! # Server Example (requires `server` feature)
//!
//! ```rust,no_run
//! use greeter::cancel::CancelToken;
//! use greeter::interceptor::LoggingInterceptor;
//! use greeter::server::{self, Greeter, GreeterServer};
//!
//! #[tokio::main]
//! async fn main() -> greeter::Result<()> {
//!     let server = GreeterServer::builder()
//!         .registry(Greeter::default().into_registry())
//!         .interceptor(LoggingInterceptor::new("logging"))
//!         .build();
//!
//!     let listener = server::bind("127.0.0.1:8080".parse().unwrap()).await?;
//!     let shutdown = CancelToken::new();
//!     server::cancel_on_ctrl_c(shutdown.clone());
//!     server::serve(listener, server, shutdown).await
//! }
//! ```
//!
//! # Client Example
//!
//! ```rust,no_run
//! use greeter::client::{CallOptions, ClientConfig, GreeterClient};
//! use greeter::proto::GreetRequest;
//!
//! #[tokio::main]
//! async fn main() -> greeter::Result<()> {
//!     let client = GreeterClient::connect(&ClientConfig::default()).await?;
//!
//!     let response = client
//!         .greet(CallOptions::new(), GreetRequest::new("alice"))
//!         .await?;
//!
//!     println!("{}", response.message.message);
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod client;
pub mod context;
pub mod error;
pub mod interceptor;
pub mod metadata;
pub mod method;
pub mod proto;
#[cfg(feature = "server")]
pub mod server;
pub mod status;
pub mod stream;
pub mod telemetry;
pub mod version;

// Re-export main types at crate root
pub use cancel::CancelToken;
pub use context::CallContext;
pub use error::{GreeterError, Result};
pub use metadata::Metadata;
pub use method::{CallShape, Method};
pub use version::{GIT_BRANCH, GIT_SHA, PKG_VERSION, version_string};

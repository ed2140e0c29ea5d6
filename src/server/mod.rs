//! gRPC server.
//!
//! This module provides:
//! - Configuration types (`config`)
//! - Named handler registration (`registry`)
//! - The greeting handlers for all four call shapes (`greeting`)
//! - The gRPC service dispatcher (`service`)
//! - Listener setup and graceful shutdown (`lifecycle`)
//!
//! # Transport
//!
//! Only plain TCP is supported; TLS and compression are left to a fronting
//! proxy. [`serve`] also hosts gRPC server reflection for `greeter.v1`.

pub mod config;
pub mod greeting;
pub mod lifecycle;
pub mod registry;
pub mod service;

pub use config::Config;
pub use greeting::Greeter;
pub use lifecycle::{ActiveCalls, bind, cancel_on_ctrl_c, serve};
pub use registry::{GreetServerStream, Handler, HandlerRegistry};
pub use service::{GreeterServer, GreeterServerBuilder};

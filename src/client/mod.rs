//! Client library for connecting to greeterd.
//!
//! Provides [`GreeterClient`], which issues the four greeter calls through
//! client interceptor chains, and [`Session`], the interactive menu used by
//! the `greet` binary.

mod call;
pub mod calls;
mod service_client;
pub mod session;

pub use call::{CallOptions, ClientCall, UnaryResponse};
pub use calls::{BidiCall, ClientStreamingCall, ServerStreamingCall};
pub use service_client::{ClientConfig, GreeterClient};
pub use session::{Flow, MenuChoice, Session};

//! Telemetry metric name constants.
//!
//! Centralised metric names for greeter calls. Consumers install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `greeter_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `method`: RPC method name (e.g. "Greet", "GreetChat")
//! - `code`: final status code (e.g. "Ok", "InvalidArgument")
//! - `direction`: stream message direction: "inbound" or "outbound"

/// Total calls handled.
///
/// Labels: `method`, `code`.
pub const CALLS_TOTAL: &str = "greeter_calls_total";

/// Call duration in seconds, from dispatch to final status.
///
/// Labels: `method`.
pub const CALL_DURATION_SECONDS: &str = "greeter_call_duration_seconds";

/// Total stream messages observed by the metrics interceptor.
///
/// Labels: `method`, `direction` ("inbound" | "outbound").
pub const STREAM_MESSAGES_TOTAL: &str = "greeter_stream_messages_total";

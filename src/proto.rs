//! Protobuf messages for `greeter.v1`.
//!
//! `GreetRequest` and `GreetResponse` are generated from
//! `proto/greeter/v1/greeter.proto` at build time. The `google.rpc` types
//! carry structured error details inside `grpc-status-details-bin`, using
//! the same encoding as the official `errdetails` packages.

tonic::include_proto!("greeter.v1");

/// Fully-qualified service name.
pub const SERVICE_NAME: &str = "greeter.v1.Greeter";

/// Encoded file descriptor set for `greeter.v1`, served by reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("greeter_descriptor");

impl GreetRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl GreetResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `google.rpc.Status`: the envelope for detailed error information.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<Any>,
}

/// `google.protobuf.Any`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

/// `google.rpc.DebugInfo`: debugging detail attached to a failed call.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugInfo {
    #[prost(string, repeated, tag = "1")]
    pub stack_entries: Vec<String>,
    #[prost(string, tag = "2")]
    pub detail: String,
}

impl DebugInfo {
    pub const TYPE_URL: &'static str = "type.googleapis.com/google.rpc.DebugInfo";

    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            stack_entries: Vec::new(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    fn mentions(needle: &str) -> bool {
        FILE_DESCRIPTOR_SET
            .windows(needle.len())
            .any(|window| window == needle.as_bytes())
    }

    #[test]
    fn descriptor_set_describes_the_service() {
        assert!(mentions("greeter/v1/greeter.proto"));
        assert!(mentions("Greeter"));
        for method in ["Greet", "GreetStream", "CollectGreet", "GreetChat"] {
            assert!(mentions(method), "{method} missing from descriptor");
        }
    }

    #[test]
    fn generated_messages_use_the_schema_tags() {
        // Field 1, wire type 2 (length-delimited), then "bob".
        assert_eq!(GreetRequest::new("bob").encode_to_vec(), b"\x0a\x03bob");
        let decoded = GreetResponse::decode(&b"\x0a\x02hi"[..]).unwrap();
        assert_eq!(decoded.message, "hi");
    }
}

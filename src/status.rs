//! Structured call status.
//!
//! A failed call carries a [`tonic::Status`]: a coarse code, a message and an
//! optional detail payload. The payload is an encoded `google.rpc.Status`
//! whose `details` hold [`DebugInfo`] entries packed as `Any`.

use prost::Message;
use prost::bytes::Bytes;
use tonic::{Code, Status};

use crate::proto::{Any, DebugInfo, RpcStatus};

/// Build a status carrying a single [`DebugInfo`] detail.
pub fn with_debug_info(code: Code, message: impl Into<String>, info: DebugInfo) -> Status {
    let message = message.into();
    let envelope = RpcStatus {
        code: code as i32,
        message: message.clone(),
        details: vec![Any {
            type_url: DebugInfo::TYPE_URL.to_string(),
            value: info.encode_to_vec(),
        }],
    };
    Status::with_details(code, message, Bytes::from(envelope.encode_to_vec()))
}

/// Decode every [`DebugInfo`] attached to `status`.
///
/// Details of other types, or an undecodable payload, are ignored.
pub fn debug_info(status: &Status) -> Vec<DebugInfo> {
    if status.details().is_empty() {
        return Vec::new();
    }
    let Ok(envelope) = RpcStatus::decode(status.details()) else {
        return Vec::new();
    };
    envelope
        .details
        .iter()
        .filter(|any| any.type_url == DebugInfo::TYPE_URL)
        .filter_map(|any| DebugInfo::decode(any.value.as_slice()).ok())
        .collect()
}

/// Human-readable description of a status, one field per line.
///
/// ```text
/// code: InvalidArgument
/// message: name must not be empty
/// details: [DebugInfo { stack_entries: [], detail: "..." }]
/// ```
pub fn describe(status: &Status) -> String {
    format!(
        "code: {:?}\nmessage: {}\ndetails: {:?}",
        status.code(),
        status.message(),
        debug_info(status)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_info_survives_the_status() {
        let status = with_debug_info(
            Code::Unknown,
            "unknown error occurred",
            DebugInfo::new("detail reason of err"),
        );
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.message(), "unknown error occurred");

        let details = debug_info(&status);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].detail, "detail reason of err");
    }

    #[test]
    fn plain_status_has_no_details() {
        let status = Status::internal("boom");
        assert!(debug_info(&status).is_empty());
        assert!(describe(&status).contains("details: []"));
    }

    #[test]
    fn garbage_details_are_ignored() {
        let status = Status::with_details(Code::Internal, "boom", Bytes::from_static(&[0xff, 0xff]));
        assert!(debug_info(&status).is_empty());
    }

    #[test]
    fn describe_lists_code_and_message() {
        let status = with_debug_info(Code::InvalidArgument, "bad", DebugInfo::new("why"));
        let text = describe(&status);
        assert!(text.contains("code: InvalidArgument"));
        assert!(text.contains("message: bad"));
        assert!(text.contains("why"));
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Newline-delimited JSON-RPC 2.0 framing for the MCP subprocess pool:
//! one JSON object per line, no embedded newlines.
//!
//! Built on a `StreamingCodec` batch encode/decode/validate shape,
//! re-targeted from an application envelope to JSON-RPC request,
//! response, and notification frames.

mod codec;
mod message;

pub use codec::StreamingCodec;
pub use message::{RequestId, RpcError, RpcMessage, RpcRequest, RpcResponse};

/// Failures from encoding or decoding a JSON-RPC frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The line was not valid JSON.
    #[error("malformed JSON-RPC frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The JSON object did not have the `jsonrpc: "2.0"` member.
    #[error("missing or invalid jsonrpc version field")]
    BadVersion,
    /// A line contained an embedded newline, which would break framing.
    #[error("frame contains an embedded newline")]
    EmbeddedNewline,
}

#[cfg(test)]
mod tests {
    use super::*;
    use message::RpcMessage;

    #[test]
    fn request_round_trips_through_a_single_line() {
        let req = RpcRequest::new(RequestId::Number(1), "tools/list", serde_json::json!({}));
        let line = StreamingCodec::encode(&RpcMessage::Request(req.clone()));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with('\n'));
        let decoded = StreamingCodec::decode(line.trim_end()).unwrap();
        match decoded {
            RpcMessage::Request(r) => assert_eq!(r.method, "tools/list"),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn batch_decode_skips_blank_lines() {
        let a = RpcRequest::new(RequestId::Number(1), "a", serde_json::json!(null));
        let b = RpcRequest::new(RequestId::Number(2), "b", serde_json::json!(null));
        let batch = StreamingCodec::encode_batch(&[
            RpcMessage::Request(a),
            RpcMessage::Request(b),
        ]);
        let with_blank = format!("\n{batch}\n");
        let decoded = StreamingCodec::decode_batch(&with_blank);
        assert_eq!(decoded.len(), 2);
        assert!(decoded.iter().all(Result::is_ok));
    }

    #[test]
    fn embedded_newline_in_a_string_field_is_rejected_on_encode_check() {
        assert!(StreamingCodec::validate_jsonl("{\"jsonrpc\":\"2.0\"}\nnot json").len() == 1);
    }

    #[test]
    fn bad_version_is_rejected() {
        let err = StreamingCodec::decode(r#"{"jsonrpc":"1.0","id":1,"method":"x"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::BadVersion));
    }

    proptest::proptest! {
        #[test]
        fn any_method_name_round_trips(method in "[a-zA-Z_/]{1,32}") {
            let req = RpcRequest::new(RequestId::Number(7), &method, serde_json::json!({"x": 1}));
            let line = StreamingCodec::encode(&RpcMessage::Request(req));
            let decoded = StreamingCodec::decode(line.trim_end()).unwrap();
            if let RpcMessage::Request(r) = decoded {
                prop_assert_eq!(r.method, method);
            }
        }
    }
}

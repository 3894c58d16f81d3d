// SPDX-License-Identifier: MIT OR Apache-2.0
//! Streaming JSONL batch encoder/decoder and validation utilities.

use crate::{ProtocolError, RpcMessage};

/// Streaming newline-delimited JSON-RPC encoder/decoder.
#[derive(Debug, Clone, Copy)]
pub struct StreamingCodec;

impl StreamingCodec {
    /// Encode one message as a single newline-terminated JSON line.
    ///
    /// # Panics
    ///
    /// Never: `RpcMessage` serialization cannot fail for well-formed values.
    #[must_use]
    pub fn encode(message: &RpcMessage) -> String {
        let mut line = serde_json::to_string(message).expect("RpcMessage always serializes");
        line.push('\n');
        line
    }

    /// Encode multiple messages into a single JSONL string.
    #[must_use]
    pub fn encode_batch(messages: &[RpcMessage]) -> String {
        let mut out = String::new();
        for m in messages {
            out.push_str(&Self::encode(m));
        }
        out
    }

    /// Decode a single line (without its trailing newline) into a message.
    pub fn decode(line: &str) -> Result<RpcMessage, ProtocolError> {
        if line.contains('\n') {
            return Err(ProtocolError::EmbeddedNewline);
        }
        let raw: serde_json::Value = serde_json::from_str(line)?;
        match raw.get("jsonrpc").and_then(serde_json::Value::as_str) {
            Some("2.0") => {}
            _ => return Err(ProtocolError::BadVersion),
        }
        Ok(serde_json::from_value(raw)?)
    }

    /// Decode a JSONL string into a vec of results, one per non-blank line.
    pub fn decode_batch(input: &str) -> Vec<Result<RpcMessage, ProtocolError>> {
        input
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| Self::decode(l.trim()))
            .collect()
    }

    /// Count the number of non-blank lines in a JSONL string.
    #[must_use]
    pub fn line_count(input: &str) -> usize {
        input.lines().filter(|l| !l.trim().is_empty()).count()
    }

    /// Validate each non-blank line, returning `(line_number, error)` for
    /// lines that fail to parse. `line_number` is 1-based.
    pub fn validate_jsonl(input: &str) -> Vec<(usize, ProtocolError)> {
        input
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .filter_map(|(idx, l)| Self::decode(l.trim()).err().map(|e| (idx + 1, e)))
            .collect()
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Correlation IDs threaded through a request, invocation, or pipeline run
//! so log lines and events from the same logical operation can be tied
//! together after the fact.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A correlation ID assigned once at the start of a request/invocation and
/// carried through every log line and event it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new random correlation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a correlation ID from its string form, e.g. from an inbound
    /// `X-Correlation-Id` header.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_distinct() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }

    #[test]
    fn parse_round_trips_through_display() {
        let id = CorrelationId::new();
        let parsed = CorrelationId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_non_uuid_text() {
        assert!(CorrelationId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn serde_roundtrip() {
        let id = CorrelationId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: CorrelationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}

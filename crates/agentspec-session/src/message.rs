// SPDX-License-Identifier: MIT OR Apache-2.0
//! One message in a session's conversation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role a message was authored under, matching the prompt-list roles
/// the agentic loop builds (`system`, `user`, `assistant`, `tool`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The system prompt, always kept at the head of a windowed view.
    System,
    /// A user-authored message.
    User,
    /// An assistant (model) response, possibly carrying tool-call markers.
    Assistant,
    /// A tool's result, or its error, fed back into the next turn.
    Tool,
}

impl Role {
    /// The lowercase string form used in prompt rendering and logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who authored this message.
    pub role: Role,
    /// The message body.
    pub content: String,
    /// For a `Tool` message, the call id it answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// When this message was appended.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a message stamped with the current time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), tool_call_id: None, created_at: Utc::now() }
    }

    /// Build a tool-result message, carrying the call id it answers.
    #[must_use]
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: content.into(), tool_call_id: Some(call_id.into()), created_at: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_as_str_is_lowercase_snake_case() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::Tool.as_str(), "tool");
    }

    #[test]
    fn tool_result_carries_call_id() {
        let m = Message::tool_result("call-1", "42");
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.tool_call_id.as_deref(), Some("call-1"));
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Conversational session state: durable message history keyed by session
//! id, two interchangeable store backends (in-memory, remote-KV-compatible),
//! and the two memory strategies that decide what a `load()` actually hands
//! back to an invocation (sliding window, threshold summarization).
//!
//! The store trait follows the same load/save split as
//! `agentspec-state::StateStore`, and the trait-object backend seam mirrors
//! the pattern `agentspec-tools`'s executor variants use to keep one call
//! surface over heterogeneous implementations.

mod memory;
mod message;
mod remote;
mod store;

pub use memory::{apply_memory_strategy, MemoryStrategy};
pub use message::{Message, Role};
pub use remote::{InMemoryKv, KvBackend, RemoteSessionStore};
pub use store::{InMemorySessionStore, Session, SessionError, SessionStore};

/// Default TTL for an idle session before the sweep evicts it.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Summarizes the oldest messages of an over-threshold session into a
/// single synthetic system message.
///
/// Implemented by whatever can reach an LLM (the agentic loop crate);
/// this crate only knows the contract and the trigger condition.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce summary text for `messages`, oldest first.
    async fn summarize(&self, messages: &[Message]) -> String;
}

/// A summarizer that concatenates the first line of each message. Used
/// where no real LLM-backed summarizer is configured (tests, the CLI's
/// offline `plan`/`apply` paths which never touch sessions at all).
pub struct TruncatingSummarizer {
    /// Maximum characters kept per summarized message.
    pub max_chars_per_message: usize,
}

impl Default for TruncatingSummarizer {
    fn default() -> Self {
        Self { max_chars_per_message: 120 }
    }
}

#[async_trait::async_trait]
impl Summarizer for TruncatingSummarizer {
    async fn summarize(&self, messages: &[Message]) -> String {
        let mut out = String::new();
        for m in messages {
            let truncated: String = m.content.chars().take(self.max_chars_per_message).collect();
            out.push_str(&format!("[{}] {truncated}\n", m.role.as_str()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn truncating_summarizer_tags_each_message_with_its_role() {
        let summarizer = TruncatingSummarizer::default();
        let messages = vec![
            Message::new(Role::User, "hello"),
            Message::new(Role::Assistant, "hi there"),
        ];
        let summary = summarizer.summarize(&messages).await;
        assert!(summary.contains("[user] hello"));
        assert!(summary.contains("[assistant] hi there"));
    }
}

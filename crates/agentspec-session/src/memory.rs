// SPDX-License-Identifier: MIT OR Apache-2.0
//! The two memory strategies a session can be configured with: a read-time
//! sliding window, and a write-time threshold summarization.

use crate::message::{Message, Role};
use crate::Summarizer;
use serde::{Deserialize, Serialize};

/// Default window size used when a `RuntimeConfig` projection leaves
/// `memory.max_messages` unspecified.
pub const DEFAULT_SLIDING_WINDOW_MAX_MESSAGES: usize = 50;

/// How a session's history is trimmed for use in a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MemoryStrategy {
    /// Keep the head system message plus the last `max_messages` entries.
    /// Applied at load time; never mutates the stored history.
    SlidingWindow {
        /// How many trailing (non-system) messages to keep.
        max_messages: usize,
    },
    /// Once stored history exceeds `threshold` messages, summarize the
    /// oldest `total - keep` into one synthetic system message. Applied at
    /// append time; mutates the stored history in place.
    Summary {
        /// Message count above which compression triggers.
        threshold: usize,
        /// How many of the most recent messages survive compression verbatim.
        keep: usize,
    },
}

impl Default for MemoryStrategy {
    fn default() -> Self {
        MemoryStrategy::SlidingWindow { max_messages: DEFAULT_SLIDING_WINDOW_MAX_MESSAGES }
    }
}

/// Apply a strategy's read-time view over stored history.
///
/// For [`MemoryStrategy::Summary`], this is the identity — summarization
/// already happened in storage, at append time.
#[must_use]
pub fn apply_memory_strategy(strategy: &MemoryStrategy, messages: &[Message]) -> Vec<Message> {
    match strategy {
        MemoryStrategy::SlidingWindow { max_messages } => windowed_view(messages, *max_messages),
        MemoryStrategy::Summary { .. } => messages.to_vec(),
    }
}

/// The head system message (if any) plus the last `max_messages` entries
/// that aren't that head message.
#[must_use]
pub fn windowed_view(messages: &[Message], max_messages: usize) -> Vec<Message> {
    let head = messages.first().filter(|m| m.role == Role::System).cloned();
    let rest_start = usize::from(head.is_some());
    let rest = &messages[rest_start..];
    let tail_start = rest.len().saturating_sub(max_messages);
    let mut out = Vec::with_capacity(head.is_some() as usize + (rest.len() - tail_start));
    out.extend(head);
    out.extend(rest[tail_start..].iter().cloned());
    out
}

/// If `messages.len() > threshold`, summarize the oldest `len - keep`
/// messages via `summarizer` and return the compressed history: one
/// synthetic system message followed by the last `keep` messages verbatim.
/// Returns `None` when no compression is needed.
pub async fn compress_if_needed(
    threshold: usize,
    keep: usize,
    messages: &[Message],
    summarizer: &dyn Summarizer,
) -> Option<Vec<Message>> {
    if messages.len() <= threshold {
        return None;
    }
    let keep = keep.min(messages.len());
    let split = messages.len() - keep;
    let (old, recent) = messages.split_at(split);
    let summary_text = summarizer.summarize(old).await;
    let mut compressed = Vec::with_capacity(1 + recent.len());
    compressed.push(Message::new(Role::System, format!("[summary of {} earlier messages] {summary_text}", old.len())));
    compressed.extend_from_slice(recent);
    Some(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TruncatingSummarizer;

    fn msgs(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::new(Role::User, format!("m{i}"))).collect()
    }

    #[test]
    fn sliding_window_keeps_head_system_plus_last_n() {
        let mut history = vec![Message::new(Role::System, "sys")];
        history.extend(msgs(10));
        let windowed = windowed_view(&history, 3);
        assert_eq!(windowed.len(), 4);
        assert_eq!(windowed[0].role, Role::System);
        assert_eq!(windowed[1].content, "m7");
        assert_eq!(windowed[3].content, "m9");
    }

    #[test]
    fn sliding_window_without_system_head_just_trims() {
        let history = msgs(5);
        let windowed = windowed_view(&history, 2);
        assert_eq!(windowed.len(), 2);
        assert_eq!(windowed[0].content, "m3");
    }

    #[test]
    fn sliding_window_no_op_when_under_cap() {
        let history = msgs(3);
        let windowed = windowed_view(&history, 50);
        assert_eq!(windowed.len(), 3);
    }

    #[tokio::test]
    async fn summary_leaves_short_history_untouched() {
        let history = msgs(5);
        let summarizer = TruncatingSummarizer::default();
        assert!(compress_if_needed(10, 2, &history, &summarizer).await.is_none());
    }

    #[tokio::test]
    async fn summary_compresses_oldest_messages_above_threshold() {
        let history = msgs(10);
        let summarizer = TruncatingSummarizer::default();
        let compressed = compress_if_needed(5, 3, &history, &summarizer).await.unwrap();
        assert_eq!(compressed.len(), 4);
        assert_eq!(compressed[0].role, Role::System);
        assert!(compressed[0].content.contains("7 earlier messages"));
        assert_eq!(compressed[1].content, "m7");
        assert_eq!(compressed[3].content, "m9");
    }
}

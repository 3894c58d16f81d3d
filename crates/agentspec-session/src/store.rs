// SPDX-License-Identifier: MIT OR Apache-2.0
//! The session store contract and its in-memory implementation.

use crate::memory::{apply_memory_strategy, compress_if_needed, MemoryStrategy};
use crate::message::Message;
use crate::Summarizer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A durable conversation context, identified by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: String,
    /// The agent this session belongs to.
    pub agent_fqn: String,
    /// Full stored message history (post any in-place summary compression).
    pub messages: Vec<Message>,
    /// The memory strategy governing this session's history.
    pub memory: MemoryStrategy,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last time a message was appended or the session was loaded.
    pub last_seen_at: DateTime<Utc>,
}

impl Session {
    fn new(id: String, agent_fqn: String, memory: MemoryStrategy) -> Self {
        let now = Utc::now();
        Session { id, agent_fqn, messages: Vec::new(), memory, created_at: now, last_seen_at: now }
    }

    /// The history view an invocation should actually use: the configured
    /// memory strategy applied over stored messages.
    #[must_use]
    pub fn view(&self) -> Vec<Message> {
        apply_memory_strategy(&self.memory, &self.messages)
    }
}

/// Failures from session store operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists under the given id.
    #[error("session {0:?} not found")]
    NotFound(String),
    /// The backing store failed outside the scope of this trait's contract.
    #[error("session store backend error: {0}")]
    Backend(String),
}

/// A session store backend: in-memory or remote-KV-compatible, interchangeably.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new session for `agent_fqn` under the given memory strategy.
    async fn create(&self, agent_fqn: &str, memory: MemoryStrategy) -> Result<Session, SessionError>;

    /// Append a message to a session's history, refreshing its TTL and
    /// applying summary compression if the configured strategy requires it.
    async fn append(&self, id: &str, message: Message) -> Result<(), SessionError>;

    /// Load a session, applying its memory strategy's read-time view.
    /// Refreshes `last_seen_at`. Returns `None` if the session does not
    /// exist or has already been evicted.
    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError>;

    /// Close (delete) a session.
    async fn close(&self, id: &str) -> Result<(), SessionError>;

    /// List ids of sessions belonging to `agent_fqn`.
    async fn list_for_agent(&self, agent_fqn: &str) -> Result<Vec<String>, SessionError>;
}

/// In-memory store: a reader/writer-locked map plus a secondary per-agent
/// index, with a background sweep evicting idle sessions.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    by_agent: RwLock<HashMap<String, HashSet<String>>>,
    ttl: Duration,
    summarizer: Arc<dyn Summarizer>,
}

impl InMemorySessionStore {
    /// Create an empty store with the given idle TTL and summarizer.
    #[must_use]
    pub fn new(ttl: Duration, summarizer: Arc<dyn Summarizer>) -> Self {
        InMemorySessionStore {
            sessions: RwLock::new(HashMap::new()),
            by_agent: RwLock::new(HashMap::new()),
            ttl,
            summarizer,
        }
    }

    /// Evict every session whose `last_seen_at + ttl < now`. Returns the
    /// number of sessions evicted.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.last_seen_at + ttl < now)
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                let mut by_agent = self.by_agent.write().await;
                if let Some(set) = by_agent.get_mut(&session.agent_fqn) {
                    set.remove(id);
                }
            }
        }
        if !expired.is_empty() {
            tracing::info!(target: "agentspec.session", count = expired.len(), "swept idle sessions");
        }
        expired.len()
    }

    /// Spawn the background sweep task, firing every `ttl / 4`.
    pub fn spawn_sweeper(store: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = (store.ttl / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.sweep().await;
            }
        })
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, agent_fqn: &str, memory: MemoryStrategy) -> Result<Session, SessionError> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session::new(id.clone(), agent_fqn.to_string(), memory);
        self.sessions.write().await.insert(id.clone(), session.clone());
        self.by_agent.write().await.entry(agent_fqn.to_string()).or_default().insert(id);
        Ok(session)
    }

    async fn append(&self, id: &str, message: Message) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id).ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.messages.push(message);
        session.last_seen_at = Utc::now();
        if let MemoryStrategy::Summary { threshold, keep } = session.memory {
            if let Some(compressed) = compress_if_needed(threshold, keep, &session.messages, self.summarizer.as_ref()).await {
                session.messages = compressed;
            }
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else { return Ok(None) };
        session.last_seen_at = Utc::now();
        let mut view = session.clone();
        view.messages = session.view();
        Ok(Some(view))
    }

    async fn close(&self, id: &str) -> Result<(), SessionError> {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = removed {
            if let Some(set) = self.by_agent.write().await.get_mut(&session.agent_fqn) {
                set.remove(id);
            }
        }
        Ok(())
    }

    async fn list_for_agent(&self, agent_fqn: &str) -> Result<Vec<String>, SessionError> {
        Ok(self.by_agent.read().await.get(agent_fqn).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::TruncatingSummarizer;

    fn store() -> InMemorySessionStore {
        InMemorySessionStore::new(Duration::from_secs(3600), Arc::new(TruncatingSummarizer::default()))
    }

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let store = store();
        let session = store.create("pkg/Agent/a", MemoryStrategy::default()).await.unwrap();
        let loaded = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert!(loaded.messages.is_empty());
    }

    #[tokio::test]
    async fn append_preserves_order() {
        let store = store();
        let session = store.create("pkg/Agent/a", MemoryStrategy::default()).await.unwrap();
        store.append(&session.id, Message::new(Role::User, "one")).await.unwrap();
        store.append(&session.id, Message::new(Role::Assistant, "two")).await.unwrap();
        let loaded = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "one");
        assert_eq!(loaded.messages[1].content, "two");
    }

    #[tokio::test]
    async fn append_to_missing_session_is_not_found() {
        let store = store();
        let err = store.append("nope", Message::new(Role::User, "x")).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn load_applies_sliding_window() {
        let store = store();
        let session = store.create("pkg/Agent/a", MemoryStrategy::SlidingWindow { max_messages: 2 }).await.unwrap();
        for i in 0..5 {
            store.append(&session.id, Message::new(Role::User, format!("m{i}"))).await.unwrap();
        }
        let loaded = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[1].content, "m4");
    }

    #[tokio::test]
    async fn append_triggers_summary_compression() {
        let store = store();
        let session = store.create("pkg/Agent/a", MemoryStrategy::Summary { threshold: 3, keep: 1 }).await.unwrap();
        for i in 0..4 {
            store.append(&session.id, Message::new(Role::User, format!("m{i}"))).await.unwrap();
        }
        let loaded = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].role, Role::System);
        assert_eq!(loaded.messages[1].content, "m3");
    }

    #[tokio::test]
    async fn close_removes_session_and_agent_index() {
        let store = store();
        let session = store.create("pkg/Agent/a", MemoryStrategy::default()).await.unwrap();
        store.close(&session.id).await.unwrap();
        assert!(store.load(&session.id).await.unwrap().is_none());
        assert!(store.list_for_agent("pkg/Agent/a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_for_agent_returns_created_sessions() {
        let store = store();
        let a = store.create("pkg/Agent/a", MemoryStrategy::default()).await.unwrap();
        let b = store.create("pkg/Agent/a", MemoryStrategy::default()).await.unwrap();
        let mut ids = store.list_for_agent("pkg/Agent/a").await.unwrap();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn sweep_evicts_sessions_past_ttl() {
        let store = InMemorySessionStore::new(Duration::from_millis(1), Arc::new(TruncatingSummarizer::default()));
        let session = store.create("pkg/Agent/a", MemoryStrategy::default()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let evicted = store.sweep().await;
        assert_eq!(evicted, 1);
        assert!(store.load(&session.id).await.unwrap().is_none());
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! A remote-KV-compatible session store: `{prefix}:session:{id}` keys with
//! TTL, mirroring how a Redis-backed deployment would serve the same
//! [`SessionStore`](crate::SessionStore) contract as [`InMemorySessionStore`](crate::InMemorySessionStore).
//!
//! The actual wire client (Redis, etc.) is an external collaborator; this
//! module only defines the [`KvBackend`] seam and drives it.

use crate::memory::{compress_if_needed, MemoryStrategy};
use crate::message::Message;
use crate::store::{Session, SessionError, SessionStore};
use crate::Summarizer;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// The minimal key-value operations a remote session backend must support.
#[async_trait::async_trait]
pub trait KvBackend: Send + Sync {
    /// Fetch a value by key.
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError>;
    /// Set a value with an expiry, refreshing the TTL if the key already exists.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), SessionError>;
    /// Delete a key.
    async fn del(&self, key: &str) -> Result<(), SessionError>;
    /// Add a member to a set key.
    async fn sadd(&self, key: &str, member: &str) -> Result<(), SessionError>;
    /// Remove a member from a set key.
    async fn srem(&self, key: &str, member: &str) -> Result<(), SessionError>;
    /// List all members of a set key.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, SessionError>;
}

/// A session store driven by any [`KvBackend`], keyed the way a Redis
/// deployment would: `{prefix}:session:{id}` for the session blob,
/// `{prefix}:agent:{name}` as the secondary per-agent index set.
pub struct RemoteSessionStore<B: KvBackend> {
    backend: B,
    prefix: String,
    ttl: Duration,
    summarizer: Arc<dyn Summarizer>,
}

impl<B: KvBackend> RemoteSessionStore<B> {
    /// Build a remote store over `backend`, namespacing all keys under `prefix`.
    #[must_use]
    pub fn new(backend: B, prefix: impl Into<String>, ttl: Duration, summarizer: Arc<dyn Summarizer>) -> Self {
        RemoteSessionStore { backend, prefix: prefix.into(), ttl, summarizer }
    }

    fn session_key(&self, id: &str) -> String {
        format!("{}:session:{id}", self.prefix)
    }

    fn agent_key(&self, agent_fqn: &str) -> String {
        format!("{}:agent:{agent_fqn}", self.prefix)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let Some(raw) = self.backend.get(&self.session_key(id)).await? else { return Ok(None) };
        let session: Session = serde_json::from_str(&raw).map_err(|e| SessionError::Backend(e.to_string()))?;
        Ok(Some(session))
    }

    async fn put_session(&self, session: &Session) -> Result<(), SessionError> {
        let raw = serde_json::to_string(session).map_err(|e| SessionError::Backend(e.to_string()))?;
        self.backend.set_ex(&self.session_key(&session.id), &raw, self.ttl).await
    }
}

#[async_trait::async_trait]
impl<B: KvBackend> SessionStore for RemoteSessionStore<B> {
    async fn create(&self, agent_fqn: &str, memory: MemoryStrategy) -> Result<Session, SessionError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let session = Session {
            id: id.clone(),
            agent_fqn: agent_fqn.to_string(),
            messages: Vec::new(),
            memory,
            created_at: now,
            last_seen_at: now,
        };
        self.put_session(&session).await?;
        self.backend.sadd(&self.agent_key(agent_fqn), &id).await?;
        Ok(session)
    }

    async fn append(&self, id: &str, message: Message) -> Result<(), SessionError> {
        let mut session = self.get_session(id).await?.ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.messages.push(message);
        session.last_seen_at = Utc::now();
        if let MemoryStrategy::Summary { threshold, keep } = session.memory {
            if let Some(compressed) = compress_if_needed(threshold, keep, &session.messages, self.summarizer.as_ref()).await {
                session.messages = compressed;
            }
        }
        self.put_session(&session).await
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let Some(mut session) = self.get_session(id).await? else { return Ok(None) };
        session.last_seen_at = Utc::now();
        let view_messages = session.view();
        self.put_session(&session).await?;
        session.messages = view_messages;
        Ok(Some(session))
    }

    async fn close(&self, id: &str) -> Result<(), SessionError> {
        if let Some(session) = self.get_session(id).await? {
            self.backend.srem(&self.agent_key(&session.agent_fqn), id).await?;
        }
        self.backend.del(&self.session_key(id)).await
    }

    async fn list_for_agent(&self, agent_fqn: &str) -> Result<Vec<String>, SessionError> {
        self.backend.smembers(&self.agent_key(agent_fqn)).await
    }
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// An in-process stand-in for a Redis-compatible backend, for tests and for
/// deployments that want the remote-shaped store without an external
/// service.
#[derive(Default)]
pub struct InMemoryKv {
    strings: RwLock<HashMap<String, Entry>>,
    sets: RwLock<HashMap<String, HashSet<String>>>,
}

impl InMemoryKv {
    /// An empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at.is_none_or(|at| at > Instant::now())
    }
}

#[async_trait::async_trait]
impl KvBackend for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.strings.read().await.get(key).filter(|e| Self::is_live(e)).map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), SessionError> {
        self.strings
            .write()
            .await
            .insert(key.to_string(), Entry { value: value.to_string(), expires_at: Some(Instant::now() + ttl) });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), SessionError> {
        self.strings.write().await.remove(key);
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), SessionError> {
        self.sets.write().await.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), SessionError> {
        if let Some(set) = self.sets.write().await.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, SessionError> {
        Ok(self.sets.read().await.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::TruncatingSummarizer;

    fn store() -> RemoteSessionStore<InMemoryKv> {
        RemoteSessionStore::new(InMemoryKv::new(), "agentspec", Duration::from_secs(3600), Arc::new(TruncatingSummarizer::default()))
    }

    #[tokio::test]
    async fn create_then_load_round_trips() {
        let store = store();
        let session = store.create("pkg/Agent/a", MemoryStrategy::default()).await.unwrap();
        let loaded = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.agent_fqn, "pkg/Agent/a");
    }

    #[tokio::test]
    async fn append_refreshes_ttl_and_preserves_order() {
        let store = store();
        let session = store.create("pkg/Agent/a", MemoryStrategy::default()).await.unwrap();
        store.append(&session.id, Message::new(Role::User, "hi")).await.unwrap();
        let loaded = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "hi");
    }

    #[tokio::test]
    async fn list_for_agent_reflects_secondary_index() {
        let store = store();
        let session = store.create("pkg/Agent/a", MemoryStrategy::default()).await.unwrap();
        assert_eq!(store.list_for_agent("pkg/Agent/a").await.unwrap(), vec![session.id.clone()]);
        store.close(&session.id).await.unwrap();
        assert!(store.list_for_agent("pkg/Agent/a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_of_unknown_session_is_none() {
        let store = store();
        assert!(store.load("nope").await.unwrap().is_none());
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::session::state::SessionState;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("session backend failure: {0}")]
    Backend(String),
    #[error("session payload could not be decoded: {0}")]
    Decode(String),
}

/// Keyed storage for in-progress conversations. Implementations must allow
/// concurrent access to distinct session ids; per-session serialization of
/// turns is the runner's job.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;
    async fn set(&self, session: SessionState) -> Result<(), StoreError>;
    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;
    async fn list(&self) -> Result<Vec<SessionState>, StoreError>;
    async fn clear(&self) -> Result<usize, StoreError>;
    /// Drops sessions idle for longer than the store's TTL. Returns how many
    /// were removed; stores without a TTL remove nothing.
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
    ttl: Option<Duration>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), ttl: Some(ttl) }
    }

    fn is_live(&self, session: &SessionState) -> bool {
        self.ttl.map_or(true, |ttl| !session.is_expired(ttl, Utc::now()))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).filter(|session| self.is_live(session)).cloned())
    }

    async fn set(&self, session: SessionState) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(session_id).is_some())
    }

    async fn list(&self) -> Result<Vec<SessionState>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut live = sessions
            .values()
            .filter(|session| self.is_live(session))
            .cloned()
            .collect::<Vec<_>>();
        live.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(live)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.len();
        sessions.clear();
        Ok(removed)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let Some(ttl) = self.ttl else {
            return Ok(0);
        };
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(ttl, now));
        Ok(before - sessions.len())
    }
}

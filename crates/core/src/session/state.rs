use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::slots::Filled;

/// Caller-supplied metadata a session is opened with.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub doc_ids: Vec<String>,
}

/// Where a session stands in its flow's slot sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Cursor {
    /// `idx` is the next slot to resolve; `idx == slots.len()` means every
    /// slot is filled and cross-slot validation is pending.
    Collecting { idx: usize },
    Complete,
    /// Too many consecutive failures on `slot`.
    GaveUp { slot: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    pub user_id: String,
    pub subject_id: String,
    pub doc_ids: Vec<String>,
    pub flow: String,
    /// Flow-specific context computed at start, stored as JSON.
    pub ctx: Value,
    pub filled: Filled,
    pub cursor: Cursor,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(meta: &SessionMeta, flow: impl Into<String>, ctx: Value) -> Self {
        let now = Utc::now();
        Self {
            session_id: meta.session_id.clone(),
            user_id: meta.user_id.clone(),
            subject_id: meta.subject_id.clone(),
            doc_ids: meta.doc_ids.clone(),
            flow: flow.into(),
            ctx,
            filled: Filled::new(),
            cursor: Cursor::Collecting { idx: 0 },
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Numeric view of the cursor: the next slot index while collecting,
    /// `-1` once the session is terminal.
    pub fn idx(&self) -> i64 {
        match self.cursor {
            Cursor::Collecting { idx } => idx as i64,
            Cursor::Complete | Cursor::GaveUp { .. } => -1,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.cursor, Cursor::Collecting { .. })
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.updated_at + ttl < now
    }
}

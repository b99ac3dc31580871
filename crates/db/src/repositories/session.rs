use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use clarifier_core::session::{Cursor, SessionState, SessionStore, StoreError};
use sqlx::Row;

use super::RepositoryError;
use crate::DbPool;

/// Durable [`SessionStore`] keeping each session as one JSON payload row.
/// The indexed columns mirror payload fields for expiry sweeps and lookups.
pub struct SqlSessionStore {
    pool: DbPool,
    ttl: Option<Duration>,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, ttl: None }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    fn is_live(&self, session: &SessionState, now: DateTime<Utc>) -> bool {
        self.ttl.map_or(true, |ttl| !session.is_expired(ttl, now))
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<SessionState>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM clarifier_session WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_session(row)?)),
            None => Ok(None),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<SessionState>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT payload_json FROM clarifier_session ORDER BY created_at ASC, session_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    async fn upsert(&self, session: &SessionState) -> Result<(), RepositoryError> {
        let payload =
            serde_json::to_string(session).map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO clarifier_session (
                session_id,
                flow,
                user_id,
                state,
                payload_json,
                created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                flow = excluded.flow,
                user_id = excluded.user_id,
                state = excluded.state,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
        )
        .bind(&session.session_id)
        .bind(&session.flow)
        .bind(&session.user_id)
        .bind(cursor_label(&session.cursor))
        .bind(payload)
        .bind(timestamp(session.created_at))
        .bind(timestamp(session.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM clarifier_session WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_all(&self) -> Result<usize, RepositoryError> {
        let result = sqlx::query("DELETE FROM clarifier_session").execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }

    async fn remove_idle_since(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let result = sqlx::query("DELETE FROM clarifier_session WHERE updated_at < ?")
            .bind(timestamp(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        let now = Utc::now();
        Ok(self.fetch(session_id).await?.filter(|session| self.is_live(session, now)))
    }

    async fn set(&self, session: SessionState) -> Result<(), StoreError> {
        Ok(self.upsert(&session).await?)
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.remove(session_id).await?)
    }

    async fn list(&self) -> Result<Vec<SessionState>, StoreError> {
        let now = Utc::now();
        let mut sessions = self.fetch_all().await?;
        sessions.retain(|session| self.is_live(session, now));
        Ok(sessions)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        Ok(self.remove_all().await?)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let Some(ttl) = self.ttl else {
            return Ok(0);
        };
        let removed = self.remove_idle_since(Utc::now() - ttl).await?;
        if removed > 0 {
            tracing::info!(
                event_name = "clarifier.sessions.purged",
                removed,
                "expired sessions removed"
            );
        }
        Ok(removed)
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<SessionState, RepositoryError> {
    let payload: String =
        row.try_get("payload_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    serde_json::from_str(&payload).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn cursor_label(cursor: &Cursor) -> &'static str {
    match cursor {
        Cursor::Collecting { .. } => "collecting",
        Cursor::Complete => "complete",
        Cursor::GaveUp { .. } => "gave_up",
    }
}

/// Fixed-width UTC timestamps so string comparison in SQL orders correctly.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

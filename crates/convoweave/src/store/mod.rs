//! Best-effort session persistence.
//!
//! Snapshots live session state into SQLite. Writes are fire-and-forget
//! from the coordinator's perspective: failures are logged by callers and
//! never surface as user-facing errors.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::session::models::Session;

/// Store for session snapshots and chat logs.
#[derive(Debug, Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Create a new store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert a snapshot of the session's current state.
    pub async fn save_session(&self, session: &Session) -> Result<()> {
        let snapshot = serde_json::to_string(session).context("serializing session snapshot")?;

        sqlx::query(
            r#"
            INSERT INTO session_snapshots (
                session_id, name, host_id, host_display_name,
                participant_count, stt_enabled, snapshot,
                created_at, ended_at, saved_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                name = excluded.name,
                host_id = excluded.host_id,
                host_display_name = excluded.host_display_name,
                participant_count = excluded.participant_count,
                stt_enabled = excluded.stt_enabled,
                snapshot = excluded.snapshot,
                ended_at = excluded.ended_at,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.name)
        .bind(&session.host_id)
        .bind(&session.host_display_name)
        .bind(session.participants.len() as i64)
        .bind(session.stt_enabled)
        .bind(&snapshot)
        .bind(session.created_at.to_rfc3339())
        .bind(session.ended_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("saving session snapshot")?;

        Ok(())
    }

    /// Append a chat message to the log.
    pub async fn save_chat(
        &self,
        session_id: &str,
        participant_id: &str,
        message: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (session_id, participant_id, message, sent_at, saved_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(participant_id)
        .bind(message)
        .bind(sent_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .context("saving chat message")?;

        Ok(())
    }

    /// Number of chat rows stored for a session.
    pub async fn chat_count(&self, session_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await
                .context("counting chat messages")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use std::collections::HashMap;

    fn test_session(id: &str) -> Session {
        Session {
            session_id: id.to_string(),
            name: "test".to_string(),
            created_at: Utc::now(),
            ended_at: None,
            host_id: None,
            host_display_name: None,
            stt_enabled: false,
            transcript: Vec::new(),
            participants: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_save_session_upserts() {
        let db = Database::in_memory().await.unwrap();
        let store = SessionStore::new(db.pool().clone());

        let mut session = test_session("s1");
        store.save_session(&session).await.unwrap();

        session.ended_at = Some(Utc::now());
        store.save_session(&session).await.unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM session_snapshots")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let ended: Option<String> =
            sqlx::query_scalar("SELECT ended_at FROM session_snapshots WHERE session_id = 's1'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert!(ended.is_some());
    }

    #[tokio::test]
    async fn test_save_chat_appends() {
        let db = Database::in_memory().await.unwrap();
        let store = SessionStore::new(db.pool().clone());

        store
            .save_chat("s1", "p1", "hello", Utc::now())
            .await
            .unwrap();
        store
            .save_chat("s1", "p1", "again", Utc::now())
            .await
            .unwrap();
        store
            .save_chat("other", "p2", "elsewhere", Utc::now())
            .await
            .unwrap();

        assert_eq!(store.chat_count("s1").await.unwrap(), 2);
        assert_eq!(store.chat_count("other").await.unwrap(), 1);
    }
}

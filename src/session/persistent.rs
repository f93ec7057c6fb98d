//! 持久化会话存储
//!
//! 使用 SQLite 存储会话记录（控制状态 + 消息日志），支持跨重启、跨进程恢复挂起的会话。

#![cfg(feature = "async-sqlite")]

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use super::state::Session;
use super::store::SessionStore;
use crate::core::AgentError;

/// SQLite 会话存储：一行一个会话，state 列为完整 JSON
pub struct SqliteSessionStore {
    pool: sqlx::sqlite::SqlitePool,
}

impl SqliteSessionStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent_sessions (
                id TEXT PRIMARY KEY,
                control_status TEXT NOT NULL,
                pending_call_id TEXT,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_agent_sessions_updated ON agent_sessions(updated_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// 定宽 UTC 时间（微秒、`Z` 结尾），保证按文本比较即按时间比较
fn db_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn store_err(e: impl std::fmt::Display) -> AgentError {
    AgentError::StoreError(e.to_string())
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Session>, AgentError> {
        let row = sqlx::query("SELECT state FROM agent_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        match row {
            Some(row) => {
                let raw: String = row.get("state");
                let session = serde_json::from_str(&raw).map_err(store_err)?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), AgentError> {
        let state = serde_json::to_string(session).map_err(store_err)?;
        sqlx::query(
            "INSERT INTO agent_sessions (id, control_status, pending_call_id, state, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                control_status = excluded.control_status,
                pending_call_id = excluded.pending_call_id,
                state = excluded.state,
                updated_at = excluded.updated_at",
        )
        .bind(&session.id)
        .bind(session.control_status.as_str())
        .bind(session.interrupt.as_ref().map(|i| i.call_id.as_str()))
        .bind(&state)
        .bind(db_time(&session.created_at))
        .bind(db_time(&session.updated_at))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn consume_interrupt(&self, session: &Session, call_id: &str) -> Result<bool, AgentError> {
        let state = serde_json::to_string(session).map_err(store_err)?;
        let result = sqlx::query(
            "UPDATE agent_sessions
             SET control_status = ?, pending_call_id = ?, state = ?, updated_at = ?
             WHERE id = ? AND control_status = 'suspended' AND pending_call_id = ?",
        )
        .bind(session.control_status.as_str())
        .bind(session.interrupt.as_ref().map(|i| i.call_id.as_str()))
        .bind(&state)
        .bind(db_time(&session.updated_at))
        .bind(&session.id)
        .bind(call_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, session_id: &str) -> Result<bool, AgentError> {
        let result = sqlx::query("DELETE FROM agent_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn cleanup_expired(&self, ttl: Duration) -> Result<usize, AgentError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(store_err)?;
        let cutoff = db_time(&(Utc::now() - ttl));
        let result = sqlx::query("DELETE FROM agent_sessions WHERE updated_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self) -> Result<usize, AgentError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM agent_sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }
}

//! 会话存储抽象层
//!
//! 定义统一的会话读写接口，支持内存和持久化（SQLite）两种实现。
//! 挂起是持久的：任何共享同一存储的进程都可以服务 resume。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::state::Session;
use crate::core::AgentError;

#[cfg(feature = "async-sqlite")]
use super::persistent::SqliteSessionStore;

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取会话；不存在时返回 None
    async fn load(&self, session_id: &str) -> Result<Option<Session>, AgentError>;

    /// 写入（覆盖）会话
    async fn save(&self, session: &Session) -> Result<(), AgentError>;

    /// 条件写入：仅当存储中的会话仍挂起在 call_id 上时写入 session。
    ///
    /// 返回 false 表示中断已被其他调用消费，此时不做任何修改。
    async fn consume_interrupt(&self, session: &Session, call_id: &str) -> Result<bool, AgentError>;

    /// 删除会话，返回是否存在
    async fn remove(&self, session_id: &str) -> Result<bool, AgentError>;

    /// 清理超过 ttl 未更新的会话（外部保留策略）
    async fn cleanup_expired(&self, ttl: Duration) -> Result<usize, AgentError>;

    /// 当前会话数
    async fn count(&self) -> Result<usize, AgentError>;
}

/// 内存会话存储（单进程）
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<Session>, AgentError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<(), AgentError> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn consume_interrupt(&self, session: &Session, call_id: &str) -> Result<bool, AgentError> {
        let mut sessions = self.sessions.write().await;
        let pending = sessions
            .get(&session.id)
            .filter(|stored| stored.is_suspended())
            .and_then(|stored| stored.interrupt.as_ref())
            .is_some_and(|i| i.call_id == call_id);
        if pending {
            sessions.insert(session.id.clone(), session.clone());
        }
        Ok(pending)
    }

    async fn remove(&self, session_id: &str) -> Result<bool, AgentError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn cleanup_expired(&self, ttl: Duration) -> Result<usize, AgentError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AgentError::StoreError(e.to_string()))?;
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.updated_at > cutoff);
        Ok(before - sessions.len())
    }

    async fn count(&self) -> Result<usize, AgentError> {
        Ok(self.sessions.read().await.len())
    }
}

/// 创建会话存储
///
/// 如果提供了 db_path 且启用了 async-sqlite feature，则使用持久化存储；否则使用内存存储
pub async fn create_session_store(db_path: Option<&std::path::Path>) -> Arc<dyn SessionStore> {
    #[cfg(feature = "async-sqlite")]
    if let Some(path) = db_path {
        match SqliteSessionStore::new(path).await {
            Ok(store) => {
                tracing::info!("Using persistent session store: {:?}", path);
                return Arc::new(store);
            }
            Err(e) => {
                tracing::warn!("Failed to create persistent store, falling back to memory: {}", e);
            }
        }
    }

    #[cfg(not(feature = "async-sqlite"))]
    if db_path.is_some() {
        tracing::warn!("Persistent session store requested but async-sqlite feature not enabled, using memory store");
    }

    tracing::info!("Using in-memory session store");
    Arc::new(MemorySessionStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;
    use crate::react::interrupt;
    use crate::session::ControlStatus;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemorySessionStore::new();
        assert!(store.load("s1").await.unwrap().is_none());

        let mut s = Session::new("s1", 10);
        s.begin_task("hello", 10);
        s.control_status = ControlStatus::Suspended;
        store.save(&s).await.unwrap();

        let loaded = store.load("s1").await.unwrap().expect("saved session");
        assert_eq!(loaded.messages, vec![Message::human("hello")]);
        assert_eq!(loaded.control_status, ControlStatus::Suspended);
        assert_eq!(store.count().await.unwrap(), 1);

        assert!(store.remove("s1").await.unwrap());
        assert!(!store.remove("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_consume_interrupt_only_once() {
        let store = MemorySessionStore::new();
        let mut s = Session::new("s1", 10);
        s.begin_task("register Jane", 10);
        interrupt::suspend(&mut s, "c1", "Grade?");
        store.save(&s).await.unwrap();

        let mut first = s.clone();
        let mut second = s.clone();
        assert_eq!(interrupt::resume(&mut first, "grade 4").unwrap(), "c1");
        assert_eq!(interrupt::resume(&mut second, "grade 5").unwrap(), "c1");

        assert!(store.consume_interrupt(&first, "c1").await.unwrap());
        assert!(!store.consume_interrupt(&second, "c1").await.unwrap());

        let stored = store.load("s1").await.unwrap().unwrap();
        assert_eq!(stored.messages.last().map(|m| m.content()), Some("grade 4"));
        assert!(!stored.is_suspended());
    }

    #[tokio::test]
    async fn test_consume_interrupt_rejects_other_call() {
        let store = MemorySessionStore::new();
        let mut s = Session::new("s1", 10);
        s.begin_task("register Jane", 10);
        interrupt::suspend(&mut s, "c2", "Grade?");
        store.save(&s).await.unwrap();

        // 同一会话之后挂起在新的调用上，旧的 resume 不能覆盖
        assert!(!store.consume_interrupt(&s, "c1").await.unwrap());
        assert!(!store.consume_interrupt(&Session::new("missing", 10), "c2").await.unwrap());
        assert!(store.load("s1").await.unwrap().unwrap().is_suspended());
    }

    #[tokio::test]
    async fn test_memory_store_cleanup() {
        let store = MemorySessionStore::new();
        let mut old = Session::new("old", 10);
        old.updated_at = Utc::now() - chrono::Duration::hours(3);
        store.save(&old).await.unwrap();
        store.save(&Session::new("fresh", 10)).await.unwrap();

        let removed = store.cleanup_expired(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.load("old").await.unwrap().is_none());
        assert!(store.load("fresh").await.unwrap().is_some());
    }
}

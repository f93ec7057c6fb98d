//! 会话监管：按会话 ID 串行化调用
//!
//! 每个会话一把异步锁；一次调用（start / resume）在整个生命周期内持有 owned guard，
//! 同一会话的两次调用不会并发执行，不同会话互不阻塞。锁表仅在进程内有效，跨进程的一致性依赖存储。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// 一次调用持有的会话锁
pub type SessionGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 等待并获取会话锁
    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        let lock = self.lock_for(session_id);
        lock.lock_owned().await
    }

    fn lock_for(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };
        // 顺带回收无人持有的锁
        locks.retain(|id, l| id == session_id || Arc::strong_count(l) > 1);
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    /// 当前登记的锁数量
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let sup = Arc::new(SessionSupervisor::new());
        let guard = sup.acquire("s1").await;
        let sup2 = Arc::clone(&sup);
        let waiter = tokio::spawn(async move {
            let _g = sup2.acquire("s1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_independent_sessions_do_not_block() {
        let sup = SessionSupervisor::new();
        let _a = sup.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(50), sup.acquire("b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_idle_locks_are_reclaimed() {
        let sup = SessionSupervisor::new();
        drop(sup.acquire("a").await);
        drop(sup.acquire("b").await);
        let _c = sup.acquire("c").await;
        assert_eq!(sup.tracked(), 1);
    }
}

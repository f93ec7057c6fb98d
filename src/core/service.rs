//! AgentService：启动时构建一次，按 Arc 传入各请求处理器
//!
//! start / resume 先在会话锁内完成边界校验与持久化（失败同步返回 Err，不产生任何事件），
//! 然后在后台任务中驱动循环，事件经有界通道交给调用方的流；锁随后台任务一同释放。

use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, SessionGuard, SessionSupervisor};
use crate::react::events::{PROCESSING_REQUEST, PROCESSING_RESPONSE};
use crate::react::{drive, interrupt, AgentEvent, EventSink, LoopContext, Pacing, Planner};
use crate::session::{Session, SessionId, SessionState, SessionStore};
use crate::tools::ToolExecutor;

/// 一次调用的事件流
pub type EventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// start / resume 的返回：会话 ID + 有序事件流
pub struct Invocation {
    pub session_id: SessionId,
    pub events: EventStream,
}

/// 服务运行参数
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub max_iterations: u32,
    pub pacing: Pacing,
    pub channel_capacity: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            pacing: Pacing::default(),
            channel_capacity: 32,
        }
    }
}

pub struct AgentService {
    planner: Planner,
    executor: ToolExecutor,
    store: Arc<dyn SessionStore>,
    supervisor: SessionSupervisor,
    settings: ServiceSettings,
}

impl AgentService {
    pub fn new(
        planner: Planner,
        executor: ToolExecutor,
        store: Arc<dyn SessionStore>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            planner,
            executor,
            store,
            supervisor: SessionSupervisor::new(),
            settings,
        }
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.executor.tool_names()
    }

    /// 开始新任务；未给 session_id 时生成新会话。会话正在等待人工输入时拒绝
    pub async fn start(
        self: &Arc<Self>,
        message: &str,
        session_id: Option<SessionId>,
    ) -> Result<Invocation, AgentError> {
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let guard = self.supervisor.acquire(&session_id).await;

        let mut session = match self.store.load(&session_id).await? {
            Some(existing) if existing.is_suspended() => {
                return Err(AgentError::SessionSuspended(session_id));
            }
            Some(existing) => existing,
            None => Session::new(session_id.clone(), self.settings.max_iterations),
        };
        session.begin_task(message, self.settings.max_iterations);
        self.store.save(&session).await?;
        tracing::info!(session_id = %session_id, "Starting task");

        Ok(self.spawn_invocation(guard, session, PROCESSING_REQUEST))
    }

    /// 以人工答案恢复挂起的会话；答案在返回流之前已持久化，同一中断只能被消费一次
    pub async fn resume(
        self: &Arc<Self>,
        session_id: &str,
        answer: &str,
    ) -> Result<Invocation, AgentError> {
        let guard = self.supervisor.acquire(session_id).await;
        let mut session = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| AgentError::UnknownSession(session_id.to_string()))?;
        let call_id = interrupt::resume(&mut session, answer)?;
        // 会话锁只在本进程内有效；共享存储的其他实例可能已先消费同一中断
        if !self.store.consume_interrupt(&session, &call_id).await? {
            tracing::info!(session_id = %session_id, call_id = %call_id, "Interrupt already consumed");
            return Err(AgentError::NoPendingInterrupt(session_id.to_string()));
        }

        Ok(self.spawn_invocation(guard, session, PROCESSING_RESPONSE))
    }

    /// 查询会话状态（存储快照，不加锁）
    pub async fn get_state(&self, session_id: &str) -> Result<SessionState, AgentError> {
        self.store
            .load(session_id)
            .await?
            .map(|s| s.state())
            .ok_or_else(|| AgentError::UnknownSession(session_id.to_string()))
    }

    fn spawn_invocation(
        self: &Arc<Self>,
        guard: SessionGuard,
        session: Session,
        opening: &'static str,
    ) -> Invocation {
        let session_id = session.id.clone();
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let disconnected = CancellationToken::new();
        let sink = EventSink::new(tx, disconnected.clone(), self.settings.pacing);

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            let ctx = LoopContext {
                planner: &service.planner,
                executor: &service.executor,
                store: service.store.as_ref(),
                sink: &sink,
            };
            drive(ctx, session, opening).await;
        });

        // 流被丢弃时触发取消，生产端在下一次发送或停顿时退出
        let drop_guard = disconnected.drop_guard();
        let events = stream::unfold((rx, drop_guard), |(mut rx, drop_guard)| async move {
            rx.recv().await.map(|event| (event, (rx, drop_guard)))
        });

        Invocation {
            session_id,
            events: Box::pin(events),
        }
    }
}

//! 规划 / 工具主循环
//!
//! Planner 步 -> （工具调度 | 挂起 | 结束）-> 下一次 Planner 步，直到终止；每次迁移的状态先持久化再推送事件。
//! drive 负责一次调用的完整事件序列：开场 thinking、过程事件、以及唯一的终止组合
//! {completed, end} | {human_input_needed} | {error, end} | {end}。

use crate::core::AgentError;
use crate::react::events::{AgentEvent, EventSink, PLANNING_NEXT_STEPS};
use crate::react::interrupt;
use crate::react::planner::{Planner, Transition};
use crate::session::{Interrupt, Session, SessionStore};
use crate::tools::{DispatchOutcome, ToolExecutor};

/// 循环退出方式
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    /// 任务完成
    Completed,
    /// 等待人工输入
    Suspended(Interrupt),
    /// 软结束：迭代用尽，或最终回复未判定为完成
    Ended,
}

/// 一次调用所需的协作者
pub struct LoopContext<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub store: &'a dyn SessionStore,
    pub sink: &'a EventSink,
}

/// 运行循环直到终止；Err 表示致命错误（推理引擎失败、并行 Tool Call、存储失败或消费端断开）
pub async fn run_loop(ctx: &LoopContext<'_>, session: &mut Session) -> Result<LoopExit, AgentError> {
    let tools = ctx.executor.descriptors();
    let mut first_step = true;
    let mut thinking_cleared = false;

    loop {
        if session.budget_exhausted() {
            tracing::info!(
                session_id = %session.id,
                iterations = session.iterations_used,
                "Iteration budget exhausted"
            );
            return Ok(LoopExit::Ended);
        }
        if !first_step {
            ctx.sink
                .emit(AgentEvent::Thinking(PLANNING_NEXT_STEPS.to_string()))
                .await?;
        }
        first_step = false;

        let outcome = ctx.planner.step(session, &tools).await?;
        ctx.store.save(session).await?;

        if !thinking_cleared && !outcome.text.trim().is_empty() {
            thinking_cleared = true;
            ctx.sink.emit(AgentEvent::ClearThinking).await?;
        }
        if outcome.tool_call.is_none() {
            ctx.sink.emit_response(&outcome.text).await?;
        }

        match outcome.next {
            Transition::End => {
                return Ok(if session.task_completed {
                    LoopExit::Completed
                } else {
                    LoopExit::Ended
                });
            }
            Transition::Planner => ctx.sink.pause_step().await?,
            Transition::Tools(call) => {
                ctx.sink
                    .emit(AgentEvent::ToolCall(call.tool_name.clone()))
                    .await?;
                match ctx.executor.dispatch(&call).await {
                    DispatchOutcome::Completed(message) => {
                        session.push(message);
                        ctx.store.save(session).await?;
                        ctx.sink.pause_step().await?;
                    }
                    DispatchOutcome::Interrupt { query } => {
                        let interrupt = interrupt::suspend(session, &call.id, query);
                        ctx.store.save(session).await?;
                        return Ok(LoopExit::Suspended(interrupt));
                    }
                }
            }
        }
    }
}

async fn open_and_run(
    ctx: &LoopContext<'_>,
    session: &mut Session,
    opening: &str,
) -> Result<LoopExit, AgentError> {
    ctx.sink
        .emit(AgentEvent::Thinking(opening.to_string()))
        .await?;
    ctx.sink.pause_step().await?;
    run_loop(ctx, session).await
}

/// 驱动一次调用：开场事件 + 循环 + 终止事件。消费端断开时静默停止
pub async fn drive(ctx: LoopContext<'_>, mut session: Session, opening: &str) {
    let result = open_and_run(&ctx, &mut session, opening).await;

    let terminal = match result {
        Ok(LoopExit::Completed) => vec![AgentEvent::Completed, AgentEvent::End],
        Ok(LoopExit::Suspended(interrupt)) => vec![AgentEvent::HumanInputNeeded(interrupt.query)],
        Ok(LoopExit::Ended) => vec![AgentEvent::End],
        Err(AgentError::ConsumerDisconnected) => {
            tracing::info!(session_id = %session.id, "Event consumer disconnected, stopping");
            return;
        }
        Err(e) => {
            tracing::warn!(session_id = %session.id, error = %e, "Invocation failed");
            vec![AgentEvent::Error(e.to_string()), AgentEvent::End]
        }
    };
    for event in terminal {
        if ctx.sink.emit(event).await.is_err() {
            tracing::info!(session_id = %session.id, "Event consumer disconnected before terminal");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::llm::MockLlmClient;
    use crate::memory::Message;
    use crate::react::events::Pacing;
    use crate::react::planner::DEFAULT_SYSTEM_PROMPT;
    use crate::session::MemorySessionStore;
    use crate::tools::{EchoTool, HumanAssistanceTool, ToolRegistry};

    async fn run(llm: MockLlmClient, max_iterations: u32) -> (Vec<AgentEvent>, Session) {
        let planner = Planner::new(Arc::new(llm), DEFAULT_SYSTEM_PROMPT);
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(HumanAssistanceTool);
        let executor = ToolExecutor::new(registry, 5);
        let store = MemorySessionStore::new();
        let (tx, mut rx) = mpsc::channel(64);
        let sink = EventSink::new(tx, CancellationToken::new(), Pacing::none());

        let mut session = Session::new("s1", max_iterations);
        session.begin_task("hello", max_iterations);
        store.save(&session).await.unwrap();
        let ctx = LoopContext {
            planner: &planner,
            executor: &executor,
            store: &store,
            sink: &sink,
        };
        drive(ctx, session, "start").await;
        drop(sink);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        let saved = store.load("s1").await.unwrap().unwrap();
        (events, saved)
    }

    fn kinds(events: &[AgentEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.kind()).collect()
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let llm = MockLlmClient::new()
            .with_tool_call("echo", json!({"text": "ping"}))
            .with_text("Finished echoing.");
        let (events, session) = run(llm, 10).await;
        assert_eq!(
            kinds(&events),
            vec![
                "thinking",
                "tool_call",
                "thinking",
                "clear_thinking",
                "response",
                "response",
                "completed",
                "end"
            ]
        );
        assert_eq!(session.iterations_used, 2);
        assert!(session.task_completed);
    }

    #[tokio::test]
    async fn test_iteration_cap_is_soft_end() {
        let llm = MockLlmClient::new()
            .with_tool_call("echo", json!({"text": "1"}))
            .with_tool_call("echo", json!({"text": "2"}))
            .with_tool_call("echo", json!({"text": "3"}));
        let (events, session) = run(llm, 2).await;
        assert_eq!(events.last(), Some(&AgentEvent::End));
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::Error(_))));
        assert_eq!(session.iterations_used, 2);
        assert!(!session.task_completed);
    }

    #[tokio::test]
    async fn test_engine_failure_emits_error_end() {
        let llm = MockLlmClient::new().with_error("connection reset");
        let (events, session) = run(llm, 10).await;
        assert_eq!(kinds(&events), vec!["thinking", "error", "end"]);
        assert_eq!(session.iterations_used, 0);
        assert_eq!(session.messages, vec![Message::human("hello")]);
    }

    #[tokio::test]
    async fn test_human_assistance_suspends_without_end() {
        let llm = MockLlmClient::new().with_tool_call("human_assistance", json!({"query": "Grade?"}));
        let (events, session) = run(llm, 10).await;
        assert_eq!(
            events,
            vec![
                AgentEvent::Thinking("start".into()),
                AgentEvent::ToolCall("human_assistance".into()),
                AgentEvent::HumanInputNeeded("Grade?".into()),
            ]
        );
        assert!(session.is_suspended());
    }
}

//! 会话记录：控制状态 + 消息日志
//!
//! 每个会话 ID 对应一条持久记录；只在步骤边界由 Orchestrator / Interrupt Controller 修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::memory::{Message, ToolResult};

/// 会话 ID（调用方可指定，缺省为 UUID）
pub type SessionId = String;

/// 控制状态：只在 Running 与 Suspended 之间交替
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    #[default]
    Running,
    Suspended,
}

impl ControlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlStatus::Running => "running",
            ControlStatus::Suspended => "suspended",
        }
    }
}

/// 人工介入请求；仅在 Suspended 时存在，被一次匹配的 resume 消费
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupt {
    pub session_id: SessionId,
    /// 挂起时待回答的工具调用 ID
    pub call_id: String,
    pub query: String,
}

/// 循环中的节点，用于 get_state 报告下一步
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopNode {
    Planner,
    Tools,
}

/// 会话状态查询结果
#[derive(Clone, Debug, Serialize)]
pub struct SessionState {
    pub session_id: SessionId,
    /// 挂起时为 Tools（恢复后从工具结果继续），否则无待执行步骤
    pub next_step: Option<LoopNode>,
    pub is_suspended: bool,
    pub interrupt: Option<Interrupt>,
}

/// 单个会话
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub messages: Vec<Message>,
    pub task_plan: Option<String>,
    pub current_step: u32,
    pub max_iterations: u32,
    pub iterations_used: u32,
    pub task_completed: bool,
    /// 步骤之间暂存的中间数据
    #[serde(default)]
    pub pending_data: Map<String, Value>,
    pub control_status: ControlStatus,
    #[serde(default)]
    pub interrupt: Option<Interrupt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>, max_iterations: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            task_plan: None,
            current_step: 0,
            max_iterations,
            iterations_used: 0,
            task_completed: false,
            pending_data: Map::new(),
            control_status: ControlStatus::Running,
            interrupt: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 开始新任务：重置任务级字段并追加用户消息。
    ///
    /// 上一任务遗留的未应答工具调用（达到迭代上限时）会先补一条错误 Tool 消息，保持日志对推理引擎合法。
    pub fn begin_task(&mut self, input: impl Into<String>, max_iterations: u32) {
        self.close_dangling_tool_call();
        self.task_plan = None;
        self.current_step = 0;
        self.max_iterations = max_iterations;
        self.iterations_used = 0;
        self.task_completed = false;
        self.pending_data.clear();
        self.push(Message::human(input));
    }

    fn close_dangling_tool_call(&mut self) {
        let Some(call) = self.messages.last().and_then(|m| m.tool_call()).cloned() else {
            return;
        };
        self.messages.push(Message::tool(
            &call,
            ToolResult::Error("Tool call was not executed: iteration limit reached".to_string()),
        ));
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// 标记任务完成（一旦为 true 不再回退）
    pub fn mark_completed(&mut self) {
        self.task_completed = true;
    }

    pub fn budget_exhausted(&self) -> bool {
        self.iterations_used >= self.max_iterations
    }

    pub fn is_suspended(&self) -> bool {
        self.control_status == ControlStatus::Suspended
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn state(&self) -> SessionState {
        let is_suspended = self.is_suspended();
        SessionState {
            session_id: self.id.clone(),
            next_step: is_suspended.then_some(LoopNode::Tools),
            is_suspended,
            interrupt: self.interrupt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCallRequest;

    #[test]
    fn test_begin_task_resets_task_fields() {
        let mut s = Session::new("s1", 10);
        s.begin_task("register a learner", 10);
        s.iterations_used = 4;
        s.current_step = 2;
        s.task_plan = Some("plan".into());
        s.pending_data.insert("school_id".into(), serde_json::json!(7));
        s.mark_completed();

        s.begin_task("another one", 5);
        assert_eq!(s.iterations_used, 0);
        assert_eq!(s.current_step, 0);
        assert_eq!(s.max_iterations, 5);
        assert!(s.task_plan.is_none());
        assert!(s.pending_data.is_empty());
        assert!(!s.task_completed);
        assert_eq!(s.messages.len(), 2);
        assert!(s.messages.iter().all(|m| m.is_human()));
    }

    #[test]
    fn test_begin_task_closes_dangling_tool_call() {
        let mut s = Session::new("s1", 1);
        s.begin_task("first", 1);
        let call = ToolCallRequest::new("search_schools", Default::default()).with_id("c1");
        s.push(Message::ai("", Some(call)));

        s.begin_task("second", 1);
        assert_eq!(s.messages.len(), 4);
        match &s.messages[2] {
            Message::Tool { call_id, result, .. } => {
                assert_eq!(call_id, "c1");
                assert!(result.is_error());
            }
            other => panic!("expected tool message, got {other:?}"),
        }
        assert!(s.messages[3].is_human());
    }

    #[test]
    fn test_state_projection() {
        let mut s = Session::new("s1", 10);
        assert_eq!(s.state().next_step, None);
        assert!(!s.state().is_suspended);

        s.control_status = ControlStatus::Suspended;
        s.interrupt = Some(Interrupt {
            session_id: "s1".into(),
            call_id: "c1".into(),
            query: "grade?".into(),
        });
        let st = s.state();
        assert_eq!(st.next_step, Some(LoopNode::Tools));
        assert!(st.is_suspended);
        assert_eq!(st.interrupt.map(|i| i.query), Some("grade?".to_string()));
    }

    #[test]
    fn test_budget() {
        let mut s = Session::new("s1", 2);
        assert!(!s.budget_exhausted());
        s.iterations_used = 2;
        assert!(s.budget_exhausted());
    }
}

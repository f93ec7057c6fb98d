//! 中断控制：人工介入的挂起与恢复
//!
//! 挂起：记录待回答的调用与问题，状态置为 Suspended（日志中该调用暂无 Tool 结果）。
//! 恢复：仅允许 Suspended；用答案合成该调用的 Tool 消息，状态回到 Running 并清除中断。
//! 持久化由调用方在返回后立即完成，且须以条件写入消费中断（见 SessionStore::consume_interrupt）。

use crate::core::AgentError;
use crate::memory::{Message, ToolResult};
use crate::session::{ControlStatus, Interrupt, Session};
use crate::tools::HUMAN_ASSISTANCE_TOOL;

/// 挂起会话
pub fn suspend(session: &mut Session, call_id: &str, query: impl Into<String>) -> Interrupt {
    let interrupt = Interrupt {
        session_id: session.id.clone(),
        call_id: call_id.to_string(),
        query: query.into(),
    };
    session.control_status = ControlStatus::Suspended;
    session.interrupt = Some(interrupt.clone());
    session.touch();
    tracing::info!(
        session_id = %session.id,
        call_id = %call_id,
        "Session suspended for human input"
    );
    interrupt
}

/// 以人工答案恢复，返回被消费的调用 ID；会话未挂起时返回 NoPendingInterrupt 且不做任何修改
pub fn resume(session: &mut Session, answer: &str) -> Result<String, AgentError> {
    let call_id = match (&session.control_status, &session.interrupt) {
        (ControlStatus::Suspended, Some(interrupt)) => interrupt.call_id.clone(),
        _ => return Err(AgentError::NoPendingInterrupt(session.id.clone())),
    };
    session.push(Message::Tool {
        call_id: call_id.clone(),
        tool_name: HUMAN_ASSISTANCE_TOOL.to_string(),
        result: ToolResult::Ok(answer.to_string()),
    });
    session.control_status = ControlStatus::Running;
    session.interrupt = None;
    tracing::info!(session_id = %session.id, "Session resumed");
    Ok(call_id)
}

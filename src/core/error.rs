//! Agent 错误类型
//!
//! 三层语义：工具失败在 Dispatch 内部消化（见 tools::ToolError），
//! 协议违规（并行 Tool Call）与推理引擎失败终止本次调用，
//! 边界错误（凭证缺失、未知会话、无效 resume）在进入循环前同步拒绝。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Missing required credential: {0}")]
    MissingCredential(String),

    #[error("Agent not initialized")]
    ServiceUnavailable,

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("No pending interrupt for session {0}")]
    NoPendingInterrupt(String),

    /// 会话正在等待人工输入，只能 resume，不能开始新任务
    #[error("Session {0} is waiting for human input")]
    SessionSuspended(String),

    #[error("Parallel tool calls not supported with interrupts (got {0})")]
    ParallelToolCalls(usize),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Session store error: {0}")]
    StoreError(String),

    #[error("Tool source error: {0}")]
    ToolSource(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    /// 事件消费端已断开（客户端关闭连接）
    #[error("Event consumer disconnected")]
    ConsumerDisconnected,
}

impl From<crate::llm::LlmError> for AgentError {
    fn from(e: crate::llm::LlmError) -> Self {
        AgentError::LlmError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_message() {
        let msg = AgentError::ParallelToolCalls(3).to_string();
        assert!(msg.contains("Parallel tool calls"));
        assert!(msg.contains('3'));
    }
}

//! 推理引擎抽象
//!
//! 黑盒：输入带角色的消息历史（开头为控制状态摘要 System 消息）+ 可用工具，
//! 输出文本与结构化的工具调用请求（可能为多个，由 Planner 拒绝并行调用）。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::{Message, ToolCallRequest};
use crate::tools::ToolDescriptor;

/// 推理引擎单轮输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl LlmResponse {
    /// 纯文本回复
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// 携带单个工具调用的回复
    pub fn tool_call(text: impl Into<String>, call: ToolCallRequest) -> Self {
        Self {
            text: text.into(),
            tool_calls: vec![call],
        }
    }
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn plan(&self, messages: &[Message], tools: &[ToolDescriptor]) -> Result<LlmResponse, LlmError>;

    fn model_id(&self) -> &str {
        "unknown"
    }
}

//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本依次返回预设的回复或错误，并记录每次收到的消息历史，便于断言循环行为。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{LlmClient, LlmError, LlmResponse};
use crate::memory::{Message, ToolCallRequest};
use crate::tools::ToolDescriptor;

/// 脚本化客户端：脚本耗尽后返回 InvalidResponse
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<LlmResponse, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: LlmResponse) -> Self {
        self.push(Ok(response));
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.with_response(LlmResponse::text(text))
    }

    /// 追加一个工具调用回复；args 为 JSON 对象（非对象时视为空参数）
    pub fn with_tool_call(self, tool: &str, args: Value) -> Self {
        let arguments = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.with_response(LlmResponse::tool_call("", ToolCallRequest::new(tool, arguments)))
    }

    pub fn with_error(self, message: &str) -> Self {
        self.push(Err(message.to_string()));
        self
    }

    fn push(&self, item: Result<LlmResponse, String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }

    /// 每次 plan 调用收到的完整输入（首条为 System 摘要）
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn plan(&self, messages: &[Message], _tools: &[ToolDescriptor]) -> Result<LlmResponse, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self
            .script
            .lock()
            .map_err(|_| LlmError::InvalidResponse("mock script poisoned".to_string()))?
            .pop_front();
        match next {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(msg)) => Err(LlmError::Network(msg)),
            None => Err(LlmError::InvalidResponse("mock script exhausted".to_string())),
        }
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

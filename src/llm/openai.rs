//! OpenAI 兼容 API 客户端
//!
//! 直接通过 reqwest 调用任意 OpenAI 兼容的 `chat/completions` 端点（可配置 base_url），
//! 以 function tools 形式传入工具描述；默认指向 Gemini 的 OpenAI 兼容端点。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::{LlmClient, LlmError, LlmResponse};
use crate::memory::{Message, ToolCallRequest, ToolResult};
use crate::tools::ToolDescriptor;

/// Gemini OpenAI 兼容端点
pub const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const GEMINI_FLASH: &str = "gemini-2.0-flash";

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: impl Into<String>,
        request_timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.to_string(),
            temperature: None,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolDescriptor]) -> ChatRequest {
        let out: Vec<ChatMessage> = messages.iter().map(to_chat_message).collect();

        let tools = if tools.is_empty() {
            None
        } else {
            Some(
                tools
                    .iter()
                    .map(|t| ChatTool {
                        r#type: "function".to_string(),
                        function: ChatFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        ChatRequest {
            model: self.model.clone(),
            messages: out,
            tools,
            temperature: self.temperature,
        }
    }
}

fn to_chat_message(msg: &Message) -> ChatMessage {
    match msg {
        Message::Human { content } => ChatMessage::plain("user", content),
        Message::System { content } => ChatMessage::plain("system", content),
        Message::Ai { content, tool_call } => ChatMessage {
            role: "assistant".to_string(),
            content: if content.is_empty() && tool_call.is_some() {
                None
            } else {
                Some(content.clone())
            },
            tool_calls: tool_call.as_ref().map(|tc| {
                vec![ChatToolCall {
                    id: tc.id.clone(),
                    r#type: "function".to_string(),
                    function: ChatFunctionCall {
                        name: tc.tool_name.clone(),
                        arguments: Value::Object(tc.arguments.clone()).to_string(),
                    },
                }]
            }),
            tool_call_id: None,
        },
        Message::Tool { call_id, result, .. } => ChatMessage {
            role: "tool".to_string(),
            content: Some(match result {
                ToolResult::Ok(text) => text.clone(),
                ToolResult::Error(text) => format!("Error: {text}"),
            }),
            tool_calls: None,
            tool_call_id: Some(call_id.clone()),
        },
    }
}

fn normalize_response(resp: ChatResponse) -> Result<LlmResponse, LlmError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

    let text = choice.message.content.unwrap_or_default();
    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter(|tc| !tc.function.name.is_empty())
        .map(|tc| {
            let arguments = match serde_json::from_str::<Value>(&tc.function.arguments) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
            let call = ToolCallRequest::new(tc.function.name, arguments);
            if tc.id.is_empty() {
                call
            } else {
                call.with_id(tc.id)
            }
        })
        .collect();

    Ok(LlmResponse { text, tool_calls })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn plan(&self, messages: &[Message], tools: &[ToolDescriptor]) -> Result<LlmResponse, LlmError> {
        let request = self.build_request(messages, tools);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Network(format!("Request timeout: {e}"))
                } else {
                    LlmError::Network(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ChatErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::InvalidResponse(format!("{e}: {body}")))?;
        normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatTool {
    r#type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "default_call_type")]
    r#type: String,
    function: ChatFunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatErrorResponse {
    error: ChatErrorBody,
}

#[derive(Debug, Deserialize)]
struct ChatErrorBody {
    message: String,
}

//! 对话消息模型
//!
//! 封闭的 tagged enum：Human / Ai / Tool / System，在构造时显式区分，
//! 不再通过字段探测推断消息类型。消息日志只追加，顺序即喂给推理引擎的因果历史。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 推理引擎请求的单个工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// 调用 ID，Tool 消息通过它回指对应的调用
    pub id: String,
    pub tool_name: String,
    /// 参数：名称 -> 标量值（非标量在 Dispatch 时视为参数错误）
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// 取字符串参数
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// 工具执行结果：正常文本或错误文本
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum ToolResult {
    Ok(String),
    Error(String),
}

impl ToolResult {
    pub fn text(&self) -> &str {
        match self {
            ToolResult::Ok(t) | ToolResult::Error(t) => t,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error(_))
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    Human {
        content: String,
    },
    Ai {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call: Option<ToolCallRequest>,
    },
    Tool {
        call_id: String,
        tool_name: String,
        result: ToolResult,
    },
    /// 控制状态摘要；只出现在交给推理引擎的输入开头，不写入会话日志
    System {
        content: String,
    },
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>, tool_call: Option<ToolCallRequest>) -> Self {
        Message::Ai {
            content: content.into(),
            tool_call,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn tool(call: &ToolCallRequest, result: ToolResult) -> Self {
        Message::Tool {
            call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            result,
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Message::Human { .. })
    }

    /// 若为带工具调用的 AI 消息，返回该调用
    pub fn tool_call(&self) -> Option<&ToolCallRequest> {
        match self {
            Message::Ai { tool_call, .. } => tool_call.as_ref(),
            _ => None,
        }
    }

    /// 文本内容；Tool 消息返回结果文本
    pub fn content(&self) -> &str {
        match self {
            Message::Human { content } | Message::Ai { content, .. } | Message::System { content } => {
                content
            }
            Message::Tool { result, .. } => result.text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_tagging() {
        let msg = Message::human("hello");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v, json!({"role": "human", "content": "hello"}));

        let plain_ai = serde_json::to_value(Message::ai("Done.", None)).unwrap();
        assert!(plain_ai.get("tool_call").is_none());
    }

    #[test]
    fn test_tool_message_links_call() {
        let mut args = Map::new();
        args.insert("name".into(), json!("Kampala International"));
        let call = ToolCallRequest::new("search_schools", args).with_id("call_1");
        let msg = Message::tool(&call, ToolResult::Error("Unknown tool".into()));

        match &msg {
            Message::Tool { call_id, tool_name, result } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(tool_name, "search_schools");
                assert!(result.is_error());
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(msg.content(), "Unknown tool");

        let back: Message = serde_json::from_value(serde_json::to_value(&msg).unwrap()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_tool_call_accessor() {
        let call = ToolCallRequest::new("human_assistance", Map::new());
        let ai = Message::ai("", Some(call.clone()));
        assert_eq!(ai.tool_call(), Some(&call));
        assert!(Message::human("x").tool_call().is_none());
        assert!(Message::human("x").is_human());
    }
}

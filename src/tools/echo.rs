//! Echo 工具（测试 / 离线演示用）

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::{Tool, ToolError};

/// Echo 工具：回显 text 参数
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back (for testing). Args: {\"text\": \"message\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string", "description": "Text to echo"}},
            "required": ["text"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("(empty)");
        Ok(text.to_string())
    }
}

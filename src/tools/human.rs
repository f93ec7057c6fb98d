//! 人工介入工具
//!
//! 推理引擎可见的普通工具描述，但调度时不执行：Dispatch 见到 HumanInput 类别即转为中断，
//! 会话挂起等待 resume 提供答案。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::tools::{Tool, ToolError, ToolKind};

pub const HUMAN_ASSISTANCE_TOOL: &str = "human_assistance";

/// 调用未给出 query 时的默认提问
pub const DEFAULT_HUMAN_QUERY: &str = "Human input needed";

#[allow(dead_code)]
#[derive(Debug, Deserialize, JsonSchema)]
struct HumanAssistanceArgs {
    /// The question to ask the human operator
    query: String,
}

pub struct HumanAssistanceTool;

#[async_trait]
impl Tool for HumanAssistanceTool {
    fn name(&self) -> &str {
        HUMAN_ASSISTANCE_TOOL
    }

    fn description(&self) -> &str {
        "Request assistance from a human. Use this when required information is missing \
         or a decision needs the user's confirmation. Args: {\"query\": \"question for the user\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(HumanAssistanceArgs)).unwrap_or_else(|_| {
            serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            })
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::HumanInput
    }

    async fn execute(&self, _args: &Map<String, Value>) -> Result<String, ToolError> {
        Err(ToolError::Unavailable(
            "human_assistance is answered through resume".to_string(),
        ))
    }
}

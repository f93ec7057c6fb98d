//! 工具调度
//!
//! 按名查找工具并在超时内执行，结果统一转为 Tool 消息（成功或携带错误），不向上抛错；
//! 人工介入类工具不执行，返回 Interrupt 交由中断控制器挂起会话。每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::memory::{Message, ToolCallRequest, ToolResult};
use crate::tools::human::DEFAULT_HUMAN_QUERY;
use crate::tools::{ToolDescriptor, ToolError, ToolKind, ToolRegistry};

/// 单次调度的结果
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// 工具已执行（或失败），消息应追加到会话日志
    Completed(Message),
    /// 需要人工介入
    Interrupt { query: String },
}

/// 工具执行器：对每次调用施加超时，并将失败映射为错误 Tool 消息
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.registry.descriptors()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 调度一个工具调用；未知工具、参数不合法、执行失败、超时都转为错误 Tool 消息
    pub async fn dispatch(&self, call: &ToolCallRequest) -> DispatchOutcome {
        let (Some(tool), Some(descriptor)) = (
            self.registry.get(&call.tool_name),
            self.registry.descriptor(&call.tool_name),
        ) else {
            let msg = format!(
                "{} is not a valid tool, try one of [{}]",
                call.tool_name,
                self.registry.tool_names().join(", ")
            );
            tracing::warn!(tool = %call.tool_name, "Unknown tool requested");
            return DispatchOutcome::Completed(Message::tool(call, ToolResult::Error(msg)));
        };

        if tool.kind() == ToolKind::HumanInput {
            let query = call
                .str_arg("query")
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .unwrap_or(DEFAULT_HUMAN_QUERY)
                .to_string();
            return DispatchOutcome::Interrupt { query };
        }

        if let Err(e) = validate_arguments(&descriptor.input_schema, &call.arguments) {
            audit(&call.tool_name, &call.arguments, "invalid_args", 0);
            return DispatchOutcome::Completed(Message::tool(
                call,
                ToolResult::Error(e.to_string()),
            ));
        }

        let start = Instant::now();
        let result = match timeout(self.timeout, tool.execute(&call.arguments)).await {
            Ok(r) => r,
            Err(_) => Err(ToolError::Timeout(self.timeout.as_secs())),
        };
        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        audit(
            &call.tool_name,
            &call.arguments,
            outcome,
            start.elapsed().as_millis() as u64,
        );

        let result = match result {
            Ok(text) => ToolResult::Ok(text),
            Err(e) => ToolResult::Error(format!("Error calling {}: {e}", call.tool_name)),
        };
        DispatchOutcome::Completed(Message::tool(call, result))
    }
}

/// 参数须为标量；schema 中 required 的字段须出现且非 null
fn validate_arguments(schema: &Value, args: &Map<String, Value>) -> Result<(), ToolError> {
    if let Some((name, _)) = args
        .iter()
        .find(|(_, v)| matches!(v, Value::Array(_) | Value::Object(_)))
    {
        return Err(ToolError::InvalidArguments(format!(
            "argument '{name}' must be a scalar value"
        )));
    }
    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .filter_map(|r| r.as_str());
    for name in required {
        if args.get(name).map_or(true, Value::is_null) {
            return Err(ToolError::InvalidArguments(format!(
                "missing required argument '{name}'"
            )));
        }
    }
    Ok(())
}

fn audit(tool: &str, args: &Map<String, Value>, outcome: &str, duration_ms: u64) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": outcome == "ok",
        "outcome": outcome,
        "duration_ms": duration_ms,
        "args_preview": args_preview(args),
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

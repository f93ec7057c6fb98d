//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! 注册时对参数 schema 做标量过滤（见 schema.rs），推理引擎看到的描述与调度时校验使用同一份 schema。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::tools::schema::scalar_input_schema;

/// 推理引擎可见的工具描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 工具类别：普通外部工具，或触发人工介入中断的特殊工具
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    External,
    HumanInput,
}

/// 工具执行失败；在 Dispatch 内转为 Tool 消息，不会终止循环
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("tool timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Remote(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool unavailable: {0}")]
    Unavailable(String),
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（推理引擎按此名发起调用）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::External
    }

    /// 执行工具；args 已按过滤后的 schema 校验
    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ToolError>;
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn Tool>,
}

/// 工具注册表：按名称存储，保留注册顺序（描述列表顺序稳定）
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// 注册工具；同名工具后注册者覆盖前者
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let filtered = scalar_input_schema(&tool.parameters_schema());
        if !filtered.dropped.is_empty() {
            tracing::warn!(
                tool = %name,
                dropped = ?filtered.dropped,
                "Dropping non-scalar parameters from tool schema"
            );
        }
        let descriptor = ToolDescriptor {
            name: name.clone(),
            description: tool.description().to_string(),
            input_schema: filtered.schema,
        };
        if self
            .tools
            .insert(
                name.clone(),
                RegisteredTool {
                    descriptor,
                    handler: tool,
                },
            )
            .is_none()
        {
            self.order.push(name.clone());
        }
        tracing::debug!(tool = %name, "Registered tool");
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| Arc::clone(&t.handler))
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|t| &t.descriptor)
    }

    /// 按注册顺序返回所有工具描述
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.descriptor.clone())
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

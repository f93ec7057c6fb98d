//! EMIS Agent - 自主任务智能体运行时
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、会话监管、AgentService 与启动构建
//! - **llm**: 推理引擎抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话日志中的消息模型
//! - **observability**: tracing 初始化
//! - **react**: Planner、中断控制、主循环与过程事件
//! - **session**: 会话记录与存储（内存 / SQLite）
//! - **tools**: 工具注册、调度，MCP 远程工具、人工介入与 Web 搜索

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod session;
pub mod tools;

pub use crate::core::{AgentBuilder, AgentError, AgentService, Invocation};
pub use crate::react::{AgentEvent, EventFrame};

//! 消息层：会话日志中的消息模型

pub mod conversation;

pub use conversation::{Message, ToolCallRequest, ToolResult};

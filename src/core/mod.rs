//! 核心编排层：错误类型、会话监管、服务对象与启动构建

pub mod builder;
pub mod error;
pub mod service;
pub mod session_supervisor;

pub use builder::AgentBuilder;
pub use error::AgentError;
pub use service::{AgentService, EventStream, Invocation, ServiceSettings};
pub use session_supervisor::{SessionGuard, SessionSupervisor};

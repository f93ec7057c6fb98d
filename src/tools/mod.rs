pub mod echo;
pub mod executor;
pub mod human;
pub mod mcp;
pub mod registry;
pub mod schema;
pub mod search;

pub use echo::EchoTool;
pub use executor::{DispatchOutcome, ToolExecutor};
pub use human::{HumanAssistanceTool, DEFAULT_HUMAN_QUERY, HUMAN_ASSISTANCE_TOOL};
pub use mcp::{load_mcp_tools, McpClient, McpTool, McpToolInfo};
pub use registry::{Tool, ToolDescriptor, ToolError, ToolKind, ToolRegistry};
pub use schema::{scalar_input_schema, FilteredSchema};
pub use search::TavilySearchTool;

//! MCP 远程工具源（Streamable HTTP）
//!
//! 基于官方 `rmcp` SDK：握手、`Mcp-Session-Id` 回传、JSON / SSE 响应体解析都由 SDK 的
//! Streamable HTTP 客户端传输完成。这里只负责 tools/list（按 nextCursor 分页）与 tools/call
//! 的结果映射，并把每个远程工具包装为 [`McpTool`]。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    LoggingLevel, LoggingMessageNotificationParam, PaginatedRequestParam, ProtocolVersion,
    RawContent,
};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{ClientHandler, RoleClient};
use serde_json::{Map, Value};

use crate::tools::{Tool, ToolError};

/// tools/list 返回的单个工具
#[derive(Debug, Clone)]
pub struct McpToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

impl From<rmcp::model::Tool> for McpToolInfo {
    fn from(tool: rmcp::model::Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.map(|d| d.to_string()),
            input_schema: Value::Object((*tool.input_schema).clone()),
        }
    }
}

/// 客户端身份；服务端日志转发到 tracing
#[derive(Clone)]
struct EmisClientHandler {
    info: ClientInfo,
}

impl EmisClientHandler {
    fn new() -> Self {
        Self {
            info: ClientInfo {
                protocol_version: ProtocolVersion::LATEST,
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    title: None,
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    icons: None,
                    website_url: None,
                },
            },
        }
    }
}

impl ClientHandler for EmisClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let logger = params.logger.as_deref().unwrap_or("-");
        let data = params.data;
        match params.level {
            LoggingLevel::Debug => tracing::debug!(logger, %data, "MCP server log"),
            LoggingLevel::Info | LoggingLevel::Notice => tracing::info!(logger, %data, "MCP server log"),
            LoggingLevel::Warning => tracing::warn!(logger, %data, "MCP server log"),
            _ => tracing::error!(logger, %data, "MCP server log"),
        }
    }
}

/// MCP 客户端：一个端点一个会话
pub struct McpClient {
    endpoint: String,
    request_timeout: Duration,
    service: RunningService<RoleClient, EmisClientHandler>,
}

impl McpClient {
    /// 建立连接并完成握手
    pub async fn connect(endpoint: &str, request_timeout_secs: u64) -> Result<Arc<Self>, ToolError> {
        let request_timeout = Duration::from_secs(request_timeout_secs);
        let transport = StreamableHttpClientTransport::from_uri(endpoint.to_string());
        let service = tokio::time::timeout(
            request_timeout,
            rmcp::serve_client(EmisClientHandler::new(), transport),
        )
        .await
        .map_err(|_| ToolError::Unavailable(format!("MCP handshake timed out: {endpoint}")))?
        .map_err(|e| ToolError::Unavailable(format!("MCP handshake failed: {e}")))?;

        let server = service
            .peer()
            .peer_info()
            .map(|info| info.server_info.name.clone())
            .unwrap_or_else(|| "unknown".to_string());
        tracing::info!(endpoint = %endpoint, server = %server, "MCP session initialized");

        Ok(Arc::new(Self {
            endpoint: endpoint.to_string(),
            request_timeout,
            service,
        }))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 拉取全部工具（跟随 nextCursor）
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, ToolError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let fut = self
                .service
                .peer()
                .list_tools(Some(PaginatedRequestParam { cursor: cursor.take() }));
            let page = tokio::time::timeout(self.request_timeout, fut)
                .await
                .map_err(|_| ToolError::Timeout(self.request_timeout.as_secs()))?
                .map_err(|e| ToolError::Remote(format!("tools/list failed: {e}")))?;
            tools.extend(page.tools.into_iter().map(McpToolInfo::from));
            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Result<String, ToolError> {
        let fut = self.service.peer().call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments: Some(args.clone()),
        });
        let result = tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| ToolError::Timeout(self.request_timeout.as_secs()))?
            .map_err(|e| ToolError::Remote(format!("tools/call failed: {e}")))?;
        call_result_text(result)
    }
}

/// tools/call 结果转为文本：text 块拼接，其他块序列化为 JSON；无内容时用 structuredContent
fn call_result_text(result: CallToolResult) -> Result<String, ToolError> {
    let mut parts: Vec<String> = result
        .content
        .iter()
        .map(|block| match &block.raw {
            RawContent::Text(text) => text.text.clone(),
            _ => serde_json::to_string(block).unwrap_or_default(),
        })
        .collect();
    if parts.is_empty() {
        if let Some(structured) = &result.structured_content {
            parts.push(structured.to_string());
        }
    }
    let text = parts.join("\n");
    if result.is_error.unwrap_or(false) {
        return Err(ToolError::Remote(text));
    }
    Ok(text)
}

/// 单个远程工具，共享同一 MCP 会话
pub struct McpTool {
    client: Arc<McpClient>,
    info: McpToolInfo,
}

impl McpTool {
    pub fn new(client: Arc<McpClient>, info: McpToolInfo) -> Self {
        Self { client, info }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        self.info.description.as_deref().unwrap_or_default()
    }

    fn parameters_schema(&self) -> Value {
        self.info.input_schema.clone()
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        self.client.call_tool(&self.info.name, args).await
    }
}

/// 连接 MCP 端点并把其全部工具包装为 McpTool
pub async fn load_mcp_tools(endpoint: &str, request_timeout_secs: u64) -> Result<Vec<McpTool>, ToolError> {
    let client = McpClient::connect(endpoint, request_timeout_secs).await?;
    let infos = client.list_tools().await?;
    tracing::info!(count = infos.len(), endpoint = %client.endpoint(), "Loaded MCP tools");
    Ok(infos
        .into_iter()
        .map(|info| McpTool::new(Arc::clone(&client), info))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::Mutex;

    const SESSION: &str = "emis-test-session";

    /// 最小 Streamable HTTP 服务端：tools/list 第一页以多行 data 的 SSE 返回，第二页为 JSON
    struct StubServer {
        url: String,
        seen_sessions: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl StubServer {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}/mcp", listener.local_addr().unwrap());
            let seen_sessions = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&seen_sessions);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(handle(stream, Arc::clone(&seen)));
                }
            });
            Self { url, seen_sessions }
        }
    }

    async fn handle(stream: TcpStream, seen: Arc<Mutex<Vec<Option<String>>>>) {
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
            return;
        }
        let method = request_line.split_whitespace().next().unwrap_or_default().to_string();
        let mut headers = HashMap::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((k, v)) = line.split_once(':') {
                headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
            }
        }
        let len: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut body = vec![0; len];
        reader.read_exact(&mut body).await.unwrap();

        let response = if method != "POST" {
            reply("405 Method Not Allowed", None, "", "")
        } else {
            let msg: Value = serde_json::from_slice(&body).unwrap();
            respond(&msg, headers.get("mcp-session-id").cloned(), &seen).await
        };
        let mut stream = reader.into_inner();
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
    }

    async fn respond(msg: &Value, session: Option<String>, seen: &Mutex<Vec<Option<String>>>) -> String {
        let Some(id) = msg.get("id") else {
            return reply("202 Accepted", None, "", "");
        };
        let method = msg["method"].as_str().unwrap_or_default();
        if method != "initialize" {
            seen.lock().await.push(session);
        }
        match method {
            "initialize" => {
                let result = json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "emis-stub", "version": "0.1.0"}
                });
                let body = json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string();
                reply("200 OK", Some("application/json"), &format!("mcp-session-id: {SESSION}\r\n"), &body)
            }
            "tools/list" if msg["params"]["cursor"].is_null() => {
                // 一个事件的 JSON 跨两行 data
                let body = format!(
                    "event: message\n\
                     data: {{\"jsonrpc\":\"2.0\",\"id\":{id},\n\
                     data: \"result\":{{\"nextCursor\":\"page-2\",\"tools\":[{{\"name\":\"search_schools\",\
                     \"description\":\"Search schools by name\",\"inputSchema\":{{\"type\":\"object\",\
                     \"properties\":{{\"name\":{{\"type\":\"string\"}}}},\"required\":[\"name\"]}}}}]}}}}\n\n"
                );
                reply("200 OK", Some("text/event-stream"), "", &body)
            }
            "tools/list" => {
                let result = json!({"tools": [{
                    "name": "register_learner",
                    "inputSchema": {"type": "object", "properties": {"name": {"type": "string"}}}
                }]});
                let body = json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string();
                reply("200 OK", Some("application/json"), "", &body)
            }
            "tools/call" => {
                let params = &msg["params"];
                let result = match params["name"].as_str() {
                    Some("search_schools") => json!({
                        "content": [{"type": "text", "text": format!(
                            "Found {} (id 12)",
                            params["arguments"]["name"].as_str().unwrap_or("?")
                        )}]
                    }),
                    _ => json!({
                        "content": [{"type": "text", "text": "learner name is required"}],
                        "isError": true
                    }),
                };
                let body = json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string();
                reply("200 OK", Some("application/json"), "", &body)
            }
            _ => {
                let body = json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "Method not found"}});
                reply("200 OK", Some("application/json"), "", &body.to_string())
            }
        }
    }

    fn reply(status: &str, content_type: Option<&str>, extra: &str, body: &str) -> String {
        let content_type = content_type
            .map(|ct| format!("content-type: {ct}\r\n"))
            .unwrap_or_default();
        format!(
            "HTTP/1.1 {status}\r\n{content_type}{extra}content-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn test_load_and_call_tools_over_streamable_http() {
        let server = StubServer::start().await;
        let tools = load_mcp_tools(&server.url, 5).await.unwrap();

        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["search_schools", "register_learner"]);
        assert_eq!(tools[0].description(), "Search schools by name");
        assert_eq!(tools[0].parameters_schema()["required"], json!(["name"]));

        let mut args = Map::new();
        args.insert("name".into(), json!("Kampala International"));
        assert_eq!(
            tools[0].execute(&args).await.unwrap(),
            "Found Kampala International (id 12)"
        );
        assert_eq!(
            tools[1].execute(&Map::new()).await.unwrap_err(),
            ToolError::Remote("learner name is required".into())
        );

        // 握手之后的每个请求都带上服务端分配的会话 ID
        let seen = server.seen_sessions.lock().await.clone();
        assert!(seen.len() >= 4);
        assert!(seen.iter().all(|s| s.as_deref() == Some(SESSION)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/mcp", listener.local_addr().unwrap());
        drop(listener);
        assert!(matches!(
            load_mcp_tools(&url, 2).await.err(),
            Some(ToolError::Unavailable(_))
        ));
    }

    #[test]
    fn test_call_result_text() {
        let ok: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "Found 2 schools"}, {"type": "text", "text": "Kampala High"}]
        }))
        .unwrap();
        assert_eq!(call_result_text(ok).unwrap(), "Found 2 schools\nKampala High");

        let structured: CallToolResult = serde_json::from_value(json!({
            "content": [],
            "structuredContent": {"id": 42}
        }))
        .unwrap();
        assert_eq!(call_result_text(structured).unwrap(), r#"{"id":42}"#);

        let failed: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "school not found"}],
            "isError": true
        }))
        .unwrap();
        assert_eq!(
            call_result_text(failed).unwrap_err(),
            ToolError::Remote("school not found".into())
        );
    }

    #[test]
    fn test_tool_info_from_rmcp_tool() {
        let tool: rmcp::model::Tool = serde_json::from_value(json!({
            "name": "register_learner",
            "inputSchema": {"type": "object", "properties": {"name": {"type": "string"}}}
        }))
        .unwrap();
        let info = McpToolInfo::from(tool);
        assert_eq!(info.name, "register_learner");
        assert!(info.description.is_none());
        assert_eq!(info.input_schema["properties"]["name"]["type"], "string");
    }
}

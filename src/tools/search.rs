//! Web 搜索工具（Tavily）
//!
//! 仅当配置的 API Key 环境变量存在时注册；每次最多返回 max_results 条结果，
//! 结果格式化为 "标题 / URL / 摘要" 文本块，超过 max_result_chars 时截断。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::tools::{Tool, ToolError};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Tavily 搜索工具
pub struct TavilySearchTool {
    client: Client,
    api_key: String,
    max_results: u32,
    max_result_chars: usize,
}

impl TavilySearchTool {
    pub fn new(
        api_key: impl Into<String>,
        max_results: u32,
        timeout_secs: u64,
        max_result_chars: usize,
    ) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ToolError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            max_results,
            max_result_chars,
        })
    }
}

fn format_results(hits: &[SearchHit], max_chars: usize) -> String {
    if hits.is_empty() {
        return "No results found.".to_string();
    }
    let text = hits
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}. {}\n{}\n{}", i + 1, h.title, h.url, h.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    if text.chars().count() > max_chars {
        format!("{}...[truncated]", text.chars().take(max_chars).collect::<String>())
    } else {
        text
    }
}

#[async_trait]
impl Tool for TavilySearchTool {
    fn name(&self) -> &str {
        "tavily_search"
    }

    fn description(&self) -> &str {
        "A search engine optimized for comprehensive, accurate, and trusted results. \
         Useful for answering questions about current events or public information. \
         Args: {\"query\": \"search query\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string", "description": "Search query"}},
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("query must be a non-empty string".into()))?;

        let response = self
            .client
            .post(TAVILY_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&json!({"query": query, "max_results": self.max_results}))
            .send()
            .await
            .map_err(|e| ToolError::Remote(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Remote(format!("search returned {status}: {body}")));
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Remote(format!("invalid search response: {e}")))?;
        Ok(format_results(&parsed.results, self.max_result_chars))
    }
}

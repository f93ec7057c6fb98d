//! Agent 构建器：统一的启动初始化逻辑
//!
//! 读取配置 → 校验推理引擎凭证 → 构建 LLM 客户端与 Planner → 连接 MCP 工具源并注册工具
//! （外加 human_assistance 与可选的 Tavily 搜索）→ 创建会话存储 → 组装 AgentService。
//! CLI 与 Web 共用同一套构建流程。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, AgentService, ServiceSettings};
use crate::llm::{LlmClient, OpenAiClient};
use crate::react::{Pacing, Planner, DEFAULT_SYSTEM_PROMPT};
use crate::session::{create_session_store, SessionStore};
use crate::tools::{load_mcp_tools, HumanAssistanceTool, TavilySearchTool, ToolExecutor, ToolRegistry};

/// Agent 构建器
pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    registry: Option<ToolRegistry>,
    store: Option<Arc<dyn SessionStore>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            registry: None,
            store: None,
        }
    }

    /// 使用给定的推理引擎（跳过凭证校验，测试或自定义后端）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 使用给定的工具注册表（跳过 MCP 连接）；human_assistance 仍会自动注册
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 检查凭证并创建 OpenAI 兼容客户端；密钥缺失时返回 MissingCredential
    pub fn build_llm(config: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
        let env = &config.llm.api_key_env;
        let api_key = std::env::var(env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AgentError::MissingCredential(env.clone()))?;
        let client = OpenAiClient::new(
            &config.llm.base_url,
            &config.llm.model,
            api_key,
            config.llm.request_timeout_secs,
        )?
        .with_temperature(config.llm.temperature);
        tracing::info!(model = %config.llm.model, base_url = %config.llm.base_url, "LLM client ready");
        Ok(Arc::new(client))
    }

    /// 连接 MCP 工具源并注册全部工具；TAVILY 密钥存在时追加搜索工具
    pub async fn build_tool_registry(config: &AppConfig) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        let tools = load_mcp_tools(&config.tools.mcp_url, config.tools.tool_timeout_secs)
            .await
            .map_err(|e| AgentError::ToolSource(format!("{}: {e}", config.tools.mcp_url)))?;
        for tool in tools {
            registry.register(tool);
        }

        let search = &config.tools.search;
        match std::env::var(&search.api_key_env) {
            Ok(key) if !key.trim().is_empty() => {
                let tool = TavilySearchTool::new(
                    key,
                    search.max_results,
                    search.timeout_secs,
                    search.max_result_chars,
                )
                .map_err(|e| AgentError::ToolSource(e.to_string()))?;
                registry.register(tool);
            }
            _ => tracing::info!(env = %search.api_key_env, "Web search disabled (no API key)"),
        }
        Ok(registry)
    }

    fn system_prompt(&self) -> Result<String, AgentError> {
        match &self.config.agent.system_prompt_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                AgentError::ConfigError(format!("system prompt {}: {e}", path.display()))
            }),
            None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    /// 组装服务；凭证缺失先于工具源连接失败报告
    pub async fn build(self) -> Result<AgentService, AgentError> {
        let llm = match self.llm.clone() {
            Some(llm) => llm,
            None => Self::build_llm(&self.config)?,
        };
        let system_prompt = self.system_prompt()?;
        let mut registry = match self.registry {
            Some(registry) => registry,
            None => Self::build_tool_registry(&self.config).await?,
        };
        registry.register(HumanAssistanceTool);
        tracing::info!(tools = ?registry.tool_names(), "Tool registry ready");

        let store = match self.store {
            Some(store) => store,
            None => create_session_store(self.config.session.db_path.as_deref()).await,
        };

        let stream = &self.config.stream;
        let settings = ServiceSettings {
            max_iterations: self.config.agent.max_iterations,
            pacing: Pacing::new(stream.chunk_delay_ms, stream.step_delay_ms),
            channel_capacity: stream.channel_capacity,
        };
        Ok(AgentService::new(
            Planner::new(llm, system_prompt),
            ToolExecutor::new(registry, self.config.tools.tool_timeout_secs),
            store,
            settings,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::EchoTool;

    #[test]
    fn test_missing_credential_is_rejected() {
        let mut config = AppConfig::default();
        config.llm.api_key_env = "EMIS_TEST_KEY_THAT_IS_NOT_SET".to_string();
        let err = AgentBuilder::build_llm(&config).err().unwrap();
        assert!(matches!(err, AgentError::MissingCredential(ref env) if env == "EMIS_TEST_KEY_THAT_IS_NOT_SET"));
    }

    #[tokio::test]
    async fn test_build_registers_human_assistance() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let service = AgentBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .with_registry(registry)
            .build()
            .await
            .unwrap();
        assert_eq!(
            service.tool_names(),
            vec!["echo".to_string(), "human_assistance".to_string()]
        );
    }
}

//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `EMIS__*` 覆盖（双下划线表示嵌套，如 `EMIS__AGENT__MAX_ITERATIONS=5`）。
//! 密钥不写入配置文件，只从 `*_env` 字段指定的环境变量读取。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::{GEMINI_FLASH, GEMINI_OPENAI_BASE_URL};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub session: SessionSection,
    pub stream: StreamSection,
    pub server: ServerSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "EMIS Agent".to_string(),
        }
    }
}

/// [llm] 段：OpenAI 兼容端点、模型、温度、超时与密钥环境变量名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// 存放 API Key 的环境变量名；启动时缺失即失败
    pub api_key_env: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: GEMINI_OPENAI_BASE_URL.to_string(),
            model: GEMINI_FLASH.to_string(),
            temperature: 0.1,
            request_timeout_secs: 60,
            api_key_env: "GOOGLE_API_KEY".to_string(),
        }
    }
}

/// [agent] 段：迭代上限与 system 模板覆盖
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: u32,
    /// 自定义 system 模板文件；未设置时使用内置模板
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            system_prompt_path: None,
        }
    }
}

/// [tools] 段：MCP 端点与单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub mcp_url: String,
    pub tool_timeout_secs: u64,
    pub search: SearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            mcp_url: "http://localhost:8000/mcp".to_string(),
            tool_timeout_secs: 30,
            search: SearchSection::default(),
        }
    }
}

/// [tools.search] 段：Tavily 搜索（环境变量存在时启用）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub api_key_env: String,
    pub max_results: u32,
    pub timeout_secs: u64,
    pub max_result_chars: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_key_env: "TAVILY_API_KEY".to_string(),
            max_results: 2,
            timeout_secs: 15,
            max_result_chars: 8000,
        }
    }
}

/// [session] 段：存储位置与保留策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// SQLite 数据库路径（需 async-sqlite feature）；未设置时使用内存存储
    pub db_path: Option<PathBuf>,
    /// 超过该时长未更新的会话由清理任务删除
    pub ttl_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            db_path: None,
            ttl_secs: 24 * 3600,
            cleanup_interval_secs: 600,
        }
    }
}

/// [stream] 段：事件节奏与通道容量
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub chunk_delay_ms: u64,
    pub step_delay_ms: u64,
    pub channel_capacity: usize,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            chunk_delay_ms: 50,
            step_delay_ms: 100,
            channel_capacity: 32,
        }
    }
}

/// [server] 段：监听地址与允许的前端来源
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

/// 从 config 目录加载配置，环境变量 EMIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 EMIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("EMIS")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WAYFARER__*` 覆盖（双下划线表示嵌套，如 `WAYFARER__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::TripParams;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub research: ResearchSection,
    pub search: SearchSection,
    pub tools: ToolsSection,
    /// CLI 使用的行程参数
    pub trip: TripParams,
}

/// [app] 段：应用名、产物输出目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub output_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            output_dir: PathBuf::from("."),
        }
    }
}

/// [llm] 段：后端选择、模型、采样与超时/重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// anthropic / openai / mock；未设置时按 API Key 自动选择
    pub provider: Option<String>,
    pub model: Option<String>,
    /// 调研子智能体可使用不同（更便宜）的模型
    pub researcher_model: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            researcher_model: None,
            base_url: None,
            max_tokens: 8192,
            temperature: 0.0,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 120,
            stream: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 1000,
        }
    }
}

/// [orchestrator] 段：决策循环上限与调研并发
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// Deciding<->Dispatching 往返上限，耗尽后强制进入 Composing
    pub max_round_trips: usize,
    /// 同时在途的调研委派数；1 表示严格串行
    pub max_concurrent_research: usize,
    /// 会话的种子用户消息
    pub seed_message: String,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_round_trips: 8,
            max_concurrent_research: 3,
            seed_message: "Plan my trip".to_string(),
        }
    }
}

/// [research] 段：调研子智能体
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchSection {
    /// 单个问题内最多的 ReAct 步数
    pub max_steps: usize,
    /// 单次委派调用的整体超时（秒）
    pub timeout_secs: u64,
    /// 时间线中子步骤结果的预览长度
    pub sub_result_preview_chars: usize,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            max_steps: 6,
            timeout_secs: 180,
            sub_result_preview_chars: 300,
        }
    }
}

/// [search] 段：Tavily 搜索
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// 未设置时读取 TAVILY_API_KEY
    pub api_key: Option<String>,
    pub endpoint: String,
    pub max_results: usize,
    pub topic: String,
    pub timeout_secs: u64,
    pub max_result_chars: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.tavily.com/search".to_string(),
            max_results: 5,
            topic: "general".to_string(),
            timeout_secs: 20,
            max_result_chars: 8000,
        }
    }
}

impl SearchSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("TAVILY_API_KEY").ok())
    }
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self { tool_timeout_secs: 30 }
    }
}

/// 从 config 目录加载配置，环境变量 WAYFARER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WAYFARER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
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
        config::Environment::with_prefix("WAYFARER")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let cfg: AppConfig = c.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

impl AppConfig {
    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.orchestrator.max_round_trips == 0 {
            return Err(config::ConfigError::Message(
                "orchestrator.max_round_trips must be at least 1".to_string(),
            ));
        }
        if self.research.max_steps == 0 {
            return Err(config::ConfigError::Message(
                "research.max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

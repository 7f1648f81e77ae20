//! 规划器构建器：统一的组件初始化逻辑
//!
//! 从 AppConfig 构建 LLM 客户端、web_search 工具注册表、调研子智能体、Tool Dispatch、
//! Decider 与 Composer，组装为 Orchestrator。测试可替换 LLM 与委派能力。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::TaskScheduler;
use crate::llm::{
    AnthropicClient, LlmClient, MockLlmClient, OpenAiClient, RetryConfig, RetryingLlmClient,
};
use crate::react::prompts::{load_prompt, COMPOSER_PROMPT, DECIDER_PROMPT, RESEARCHER_PROMPT};
use crate::react::{Composer, Decider, Orchestrator, ResearchAgent};
use crate::tools::{DelegatedCapability, Tool, ToolDispatch, ToolExecutor, ToolRegistry, WebSearchTool};

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// 选择后端：显式 provider 优先，否则按 API Key 自动选择，都没有时使用 Mock
fn resolve_provider(cfg: &AppConfig) -> String {
    if let Some(p) = cfg.llm.provider.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        return p.to_lowercase();
    }
    if std::env::var("ANTHROPIC_API_KEY").is_ok() {
        "anthropic".to_string()
    } else if std::env::var("OPENAI_API_KEY").is_ok() {
        "openai".to_string()
    } else {
        "mock".to_string()
    }
}

/// 按配置创建 LLM 客户端；model_override 用于调研子智能体的独立模型。
/// 真实后端外包一层 RetryingLlmClient
pub fn create_llm_from_config(cfg: &AppConfig, model_override: Option<&str>) -> Arc<dyn LlmClient> {
    let provider = resolve_provider(cfg);
    let retry = RetryConfig {
        max_retries: cfg.llm.retry.max_retries,
        initial_backoff: Duration::from_millis(cfg.llm.retry.initial_backoff_ms),
    };
    let model = model_override.or(cfg.llm.model.as_deref());

    let client: Arc<dyn LlmClient> = match provider.as_str() {
        "anthropic" => {
            let model = model.unwrap_or(DEFAULT_ANTHROPIC_MODEL);
            tracing::info!("Using Anthropic LLM ({})", model);
            Arc::new(
                AnthropicClient::new(
                    cfg.llm.base_url.as_deref(),
                    model,
                    None,
                    Duration::from_secs(cfg.llm.timeouts.request),
                )
                .with_sampling(cfg.llm.temperature, cfg.llm.max_tokens),
            )
        }
        "openai" => {
            let model = model.unwrap_or(DEFAULT_OPENAI_MODEL);
            tracing::info!("Using OpenAI-compatible LLM ({})", model);
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), model, None)
                    .with_sampling(cfg.llm.temperature, cfg.llm.max_tokens),
            )
        }
        other => {
            if other != "mock" {
                tracing::warn!(provider = other, "unknown LLM provider, using Mock LLM");
            } else {
                tracing::warn!("No API key set, using Mock LLM");
            }
            return Arc::new(MockLlmClient);
        }
    };
    Arc::new(RetryingLlmClient::new(client, retry))
}

/// 规划器构建器
pub struct PlannerBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    researcher_llm: Option<Arc<dyn LlmClient>>,
    delegate: Option<Arc<dyn DelegatedCapability>>,
    extra_tools: Vec<Arc<dyn Tool>>,
}

impl PlannerBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            researcher_llm: None,
            delegate: None,
            extra_tools: Vec::new(),
        }
    }

    /// decider 与 composer 使用的 LLM
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_researcher_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.researcher_llm = Some(llm);
        self
    }

    /// 替换整个调研委派能力
    pub fn with_delegate(mut self, delegate: Arc<dyn DelegatedCapability>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// 追加调研子智能体可用的工具
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 调研子智能体的工具注册表：web_search + 额外工具
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(WebSearchTool::new(&self.config.search));
        for tool in &self.extra_tools {
            tools.register_arc(tool.clone());
        }
        tools
    }

    fn build_delegate(&self, llm: &Arc<dyn LlmClient>) -> Arc<dyn DelegatedCapability> {
        if let Some(delegate) = &self.delegate {
            return delegate.clone();
        }
        let researcher_llm = match (&self.researcher_llm, &self.config.llm.researcher_model) {
            (Some(l), _) => l.clone(),
            (None, Some(model)) if self.llm.is_none() => create_llm_from_config(&self.config, Some(model)),
            _ => llm.clone(),
        };
        let executor = ToolExecutor::new(self.build_tool_registry(), self.config.tools.tool_timeout_secs);
        Arc::new(ResearchAgent::new(
            researcher_llm,
            executor,
            load_prompt("researcher", RESEARCHER_PROMPT),
            self.config.research.max_steps,
        ))
    }

    pub fn build(self) -> PlannerComponents {
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config, None));
        let delegate = self.build_delegate(&llm);
        let orchestrator = &self.config.orchestrator;
        let dispatch = ToolDispatch::new(
            delegate,
            TaskScheduler::new(orchestrator.max_concurrent_research),
            Duration::from_secs(self.config.research.timeout_secs),
        );
        let orchestrator = Orchestrator::new(
            Decider::new(llm.clone(), load_prompt("decider", DECIDER_PROMPT)),
            dispatch,
            Composer::new(llm.clone(), load_prompt("composer", COMPOSER_PROMPT)),
            orchestrator.max_round_trips,
        );
        PlannerComponents {
            orchestrator,
            llm,
            config: self.config,
        }
    }
}

/// 预构建的规划组件，可在多个会话间共享（每个会话有自己的 Session 与上下文）
pub struct PlannerComponents {
    pub orchestrator: Orchestrator,
    pub llm: Arc<dyn LlmClient>,
    pub config: AppConfig,
}

impl PlannerComponents {
    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

//! LLM 客户端抽象
//!
//! 所有后端（Anthropic / OpenAI 兼容 / Mock）实现 LlmClient：complete（非流式）、complete_stream（流式 Token）。
//! 重试策略属于适配器层：RetryingLlmClient 包装任意后端，对可重试错误做指数退避。

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::llm::ChatMessage;

/// 流式 Token
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 网络抖动、限流、超时与 5xx 可重试；鉴权与请求错误不重试
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Network(_) | LlmError::RateLimited { .. } | LlmError::Timeout => true,
            LlmError::Api { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529),
            LlmError::InvalidRequest(_) | LlmError::InvalidResponse(_) => false,
        }
    }
}

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }

    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Token 使用统计（累计值，可在多个克隆间共享）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    prompt_tokens: Arc<AtomicU64>,
    completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    fn backoff(&self, attempt: u32, err: &LlmError) -> Duration {
        if let LlmError::RateLimited { retry_after_ms } = err {
            return Duration::from_millis(*retry_after_ms);
        }
        self.initial_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// 带重试的 LLM 包装：流式调用只重试建立连接，不重试中途断流
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(messages).await {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let wait = self.config.backoff(attempt, &e);
                    tracing::warn!(attempt, backoff_ms = wait.as_millis() as u64, error = %e, "llm complete: retrying");
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete_stream(messages).await {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let wait = self.config.backoff(attempt, &e);
                    tracing::warn!(attempt, backoff_ms = wait.as_millis() as u64, error = %e, "llm stream: retrying");
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::Api { status: 529, message: String::new() }.is_retryable());
        assert!(!LlmError::Api { status: 401, message: String::new() }.is_retryable());
        assert!(!LlmError::InvalidResponse(String::new()).is_retryable());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let scripted = Arc::new(
            ScriptedLlmClient::new()
                .then_err(LlmError::Network("reset".to_string()))
                .then_ok("fine"),
        );
        let client = RetryingLlmClient::new(scripted.clone(), fast_retry(2));
        let out = client.complete(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(out, "fine");
        assert_eq!(scripted.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_on_auth_error() {
        let scripted = Arc::new(ScriptedLlmClient::new().then_err(LlmError::Api {
            status: 401,
            message: "invalid x-api-key".to_string(),
        }));
        let client = RetryingLlmClient::new(scripted.clone(), fast_retry(3));
        assert!(client.complete(&[ChatMessage::user("hi")]).await.is_err());
        assert_eq!(scripted.calls(), 1);
    }

    #[test]
    fn test_token_usage_accumulates() {
        let usage = TokenUsage::new();
        usage.add(10, 5);
        usage.clone().add(1, 1);
        assert_eq!(usage.get(), (11, 6, 17));
    }
}

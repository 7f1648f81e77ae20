//! Anthropic Messages API 客户端
//!
//! 通过 reqwest 直接调用 /v1/messages；响应的 content block 数组在此规范化为文本，
//! 流式模式下用 reqwest-eventsource 解析 SSE，只取 text_delta。

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde_json::{json, Value};

use crate::llm::{normalize_content, split_system, ChatMessage, LlmClient, LlmError, TokenStream, TokenUsage};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    request_timeout: Duration,
    usage: TokenUsage,
}

/// SSE 单条消息的解析结果
#[derive(Debug, PartialEq)]
enum StreamSignal {
    Delta(String),
    Stop,
    Skip,
}

fn parse_stream_data(data: &str) -> Result<StreamSignal, LlmError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| LlmError::InvalidResponse(format!("bad SSE payload: {e}")))?;
    match value["type"].as_str() {
        Some("content_block_delta") => match value["delta"]["text"].as_str() {
            Some(text) if !text.is_empty() => Ok(StreamSignal::Delta(text.to_string())),
            _ => Ok(StreamSignal::Skip),
        },
        Some("message_stop") => Ok(StreamSignal::Stop),
        Some("error") => Err(LlmError::Network(format!(
            "stream error: {}",
            value["error"]["message"].as_str().unwrap_or("unknown")
        ))),
        _ => Ok(StreamSignal::Skip),
    }
}

fn status_error(status: u16, body: String, retry_after: Option<u64>) -> LlmError {
    if status == 429 {
        LlmError::RateLimited {
            retry_after_ms: retry_after.unwrap_or(60) * 1000,
        }
    } else {
        LlmError::Api { status, message: body }
    }
}

impl AnthropicClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        request_timeout: Duration,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .unwrap_or_default();
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            base_url: base_url.unwrap_or(ANTHROPIC_BASE_URL).trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            request_timeout,
            usage: TokenUsage::new(),
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn build_body(&self, messages: &[ChatMessage], stream: bool) -> Value {
        let (system, turns) = split_system(messages);
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": turns,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = self.build_body(messages, false);
        let response = self
            .request(&body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text, retry_after));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        if let Some(usage) = value.get("usage") {
            self.usage.add(
                usage["input_tokens"].as_u64().unwrap_or(0),
                usage["output_tokens"].as_u64().unwrap_or(0),
            );
        }
        match value.get("content") {
            Some(content) => Ok(normalize_content(content)),
            None => Err(LlmError::InvalidResponse("missing content".to_string())),
        }
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let body = self.build_body(messages, true);
        let mut source: EventSource = self
            .request(&body)
            .eventsource()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        // 先等到 Open 或首个错误，使连接失败能走 RetryingLlmClient 的重试
        match source.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(_))) => {}
            Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
                let text = response.text().await.unwrap_or_default();
                source.close();
                return Err(status_error(status.as_u16(), text, None));
            }
            Some(Err(e)) => {
                source.close();
                return Err(LlmError::Network(e.to_string()));
            }
            None => return Err(LlmError::InvalidResponse("stream closed before open".to_string())),
        }

        let tokens = stream::unfold(Some(source), |state| async move {
            let mut source = state?;
            loop {
                match source.next().await {
                    None => return None,
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(msg))) => match parse_stream_data(&msg.data) {
                        Ok(StreamSignal::Delta(text)) => return Some((Ok(text), Some(source))),
                        Ok(StreamSignal::Skip) => continue,
                        Ok(StreamSignal::Stop) => {
                            source.close();
                            return None;
                        }
                        Err(e) => {
                            source.close();
                            return Some((Err(e), None));
                        }
                    },
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) => return None,
                    Some(Err(e)) => {
                        source.close();
                        return Some((Err(LlmError::Network(e.to_string())), None));
                    }
                }
            }
        });
        Ok(Box::pin(tokens))
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

//! Mock LLM 客户端（无需 API）
//!
//! - MockLlmClient：按 system 指令判断角色（decider / 调研 / composer），离线跑通一次完整规划
//! - ScriptedLlmClient：按脚本依次返回预设结果并记录收到的消息，供测试使用

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{ChatMessage, LlmClient, LlmError, Role, TokenStream};

/// 流式输出时每段字符数（模拟打字效果）
const CHUNK_CHARS: usize = 6;

fn chunked(text: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

fn chunk_stream(text: &str, chunk_chars: usize) -> TokenStream {
    let items: Vec<Result<String, LlmError>> = chunked(text, chunk_chars).into_iter().map(Ok).collect();
    Box::pin(stream::iter(items))
}

/// 离线 Mock：decider 先请求两项调研再交接，调研直接给出答案，composer 汇总调研结果
#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    fn respond(messages: &[ChatMessage]) -> String {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let results: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::User && m.content.starts_with("Result for"))
            .map(|m| m.content.as_str())
            .collect();

        if system.contains("call_researcher") {
            let destination = system
                .lines()
                .find_map(|l| l.trim().strip_prefix("- To: "))
                .unwrap_or("the destination");
            if results.is_empty() {
                format!(
                    "I'll gather live data first.\n```json\n{{\"tool_calls\": [\
                     {{\"tool\": \"call_researcher\", \"args\": {{\"question\": \"Flight options to {destination}\"}}}}, \
                     {{\"tool\": \"call_researcher\", \"args\": {{\"question\": \"Hotels in {destination}\"}}}}]}}\n```"
                )
            } else {
                "Research complete, handing off.\n```json\n{\"tool\": \"call_planner\", \"args\": {}}\n```".to_string()
            }
        } else if system.contains("web_search") {
            let question = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or("(no question)");
            format!("Mock findings for: {question}")
        } else {
            let mut plan = String::from("# Your Travel Plan\n\n");
            for r in results {
                plan.push_str("- ");
                plan.push_str(r.lines().skip(1).collect::<Vec<_>>().join(" ").trim());
                plan.push('\n');
            }
            plan
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        Ok(Self::respond(messages))
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        Ok(chunk_stream(&Self::respond(messages), CHUNK_CHARS))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// 脚本化客户端：依次弹出预设结果；脚本耗尽后返回 fallback（未设置则报错）
#[derive(Debug)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    received: Mutex<Vec<Vec<ChatMessage>>>,
    chunk_chars: usize,
}

impl Default for ScriptedLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            received: Mutex::new(Vec::new()),
            chunk_chars: CHUNK_CHARS,
        }
    }

    pub fn then_ok(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn then_err(self, err: LlmError) -> Self {
        self.push(Err(err));
        self
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars;
        self
    }

    fn push(&self, item: Result<String, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }

    /// 已收到的调用次数
    pub fn calls(&self) -> usize {
        self.received.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 每次调用收到的完整消息列表
    pub fn received(&self) -> Vec<Vec<ChatMessage>> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        if let Ok(mut received) = self.received.lock() {
            received.push(messages.to_vec());
        }
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match (scripted, &self.fallback) {
            (Some(item), _) => item,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.next(messages)
    }

    async fn complete_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let text = self.next(messages)?;
        Ok(chunk_stream(&text, self.chunk_chars))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

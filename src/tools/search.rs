//! web_search 工具：调用 Tavily 搜索 API
//!
//! POST JSON 到配置的 endpoint，带超时；结果格式化为 Markdown 列表（标题、URL、摘要），
//! 超过 max_result_chars 时截断并追加 ...[truncated]。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::SearchSection;
use crate::core::ExecutionContext;
use crate::react::events::WEB_SEARCH;
use crate::tools::Tool;

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Tavily 搜索工具
pub struct WebSearchTool {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    max_results: usize,
    topic: String,
    max_result_chars: usize,
}

impl WebSearchTool {
    pub fn new(section: &SearchSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: section.resolved_api_key(),
            endpoint: section.endpoint.clone(),
            max_results: section.max_results,
            topic: section.topic.clone(),
            max_result_chars: section.max_result_chars,
        }
    }
}

fn format_results(response: TavilyResponse, max_chars: usize) -> String {
    let mut out = String::new();
    if let Some(answer) = response.answer.filter(|a| !a.trim().is_empty()) {
        out.push_str("Summary: ");
        out.push_str(answer.trim());
        out.push_str("\n\n");
    }
    if response.results.is_empty() {
        out.push_str("No results found.");
    }
    for (i, r) in response.results.iter().enumerate() {
        out.push_str(&format!("{}. [{}]({})\n   {}\n", i + 1, r.title.trim(), r.url, r.content.trim()));
    }
    truncate_chars(out.trim_end(), max_chars)
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...[truncated]", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH
    }

    fn description(&self) -> &str {
        "Search the web for current travel information (flights, hotels, events, visas). Args: {\"query\": \"search terms\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ExecutionContext) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| "Missing required arg: query".to_string())?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| "TAVILY_API_KEY is not configured".to_string())?;

        let body = json!({
            "query": query,
            "max_results": self.max_results,
            "topic": self.topic,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Search request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("Search API returned {}: {}", status.as_u16(), truncate_chars(&text, 200)));
        }
        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| format!("Invalid search response: {e}"))?;
        Ok(format_results(parsed, self.max_result_chars))
    }
}

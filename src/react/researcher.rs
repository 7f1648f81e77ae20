//! 调研子智能体：针对单个问题的有界 ReAct 循环
//!
//! 每步调用 LLM，输出为 web_search 调用则执行并把 Observation 写回，输出为纯文本则作为答案。
//! 工具失败作为 Observation 反馈给模型，不向上抛出；步数耗尽时返回最后一次模型输出。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::{ExecutionContext, PlannerError};
use crate::llm::{ChatMessage, LlmClient};
use crate::react::planner::parse_tool_call;
use crate::tools::{DelegatedCapability, ToolError, ToolExecutor};

/// 解析失败时追加的纠正提示
const FORMAT_RETRY_PROMPT: &str =
    "Your last reply could not be parsed. Either call a tool with {\"tool\": \"<name>\", \"args\": {...}} or reply with the final answer as plain text.";

pub struct ResearchAgent {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    system_prompt: String,
    max_steps: usize,
}

impl ResearchAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        system_prompt: impl Into<String>,
        max_steps: usize,
    ) -> Self {
        Self {
            llm,
            executor,
            system_prompt: system_prompt.into(),
            max_steps: max_steps.max(1),
        }
    }

    fn system(&self) -> String {
        format!(
            "{}\n\nAvailable tools (JSON):\n{}\n\nTo call a tool, reply with only: {{\"tool\": \"<name>\", \"args\": {{...}}}}",
            self.system_prompt,
            self.executor.schema_json()
        )
    }
}

#[async_trait]
impl DelegatedCapability for ResearchAgent {
    fn name(&self) -> &str {
        "researcher"
    }

    async fn invoke(&self, question: &str, ctx: &ExecutionContext) -> Result<String, PlannerError> {
        let mut messages = vec![ChatMessage::system(self.system()), ChatMessage::user(question)];
        let mut last_output = String::new();

        for step in 0..self.max_steps {
            if ctx.is_cancelled() {
                return Err(PlannerError::Cancelled);
            }
            let output = tokio::select! {
                _ = ctx.cancelled() => return Err(PlannerError::Cancelled),
                r = self.llm.complete(&messages) => r?,
            };
            debug!(step, work_item = ?ctx.work_item_id(), "research step");

            match parse_tool_call(&output) {
                Ok(Some(call)) => {
                    let observation = match self.executor.execute(&call.tool, call.args, ctx).await {
                        Ok(content) => content,
                        Err(ToolError::Cancelled) => return Err(PlannerError::Cancelled),
                        Err(e) => format!("Error: {e}"),
                    };
                    messages.push(ChatMessage::assistant(output.clone()));
                    messages.push(ChatMessage::user(format!(
                        "Observation from {}: {}",
                        call.tool, observation
                    )));
                }
                Ok(None) => return Ok(output.trim().to_string()),
                Err(e) => {
                    debug!(error = %e, "research output not parseable, retrying");
                    messages.push(ChatMessage::assistant(output.clone()));
                    messages.push(ChatMessage::user(FORMAT_RETRY_PROMPT));
                }
            }
            last_output = output;
        }

        warn!(max_steps = self.max_steps, "research step limit reached");
        Ok(last_output.trim().to_string())
    }
}

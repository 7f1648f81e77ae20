//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时。execute 为每次工具调用派生子运行上下文，
//! 发出 DelegateSubcall 的 Started / Ended 事件，并输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;

use crate::core::ExecutionContext;
use crate::react::events::{Node, StepOutput};
use crate::tools::ToolRegistry;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    Unknown(String),

    #[error("Tool execution failed: {0}")]
    Failed(String),

    #[error("Tool timed out: {0}")]
    Timeout(String),

    #[error("Tool call cancelled")]
    Cancelled,
}

/// 工具执行器：对每次调用施加超时与取消，并将结果映射为 ToolError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具。子步骤事件的 input 取 args.query（没有则为整个 args 的 JSON）
    pub async fn execute(
        &self,
        tool_name: &str,
        args: Value,
        ctx: &ExecutionContext,
    ) -> Result<String, ToolError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::Unknown(tool_name.to_string()))?;

        let sub_ctx = ctx.child();
        let start = Instant::now();
        let preview = args_preview(&args);
        sub_ctx.started(Node::DelegateSubcall, tool_name, step_input(&args));

        let result = tokio::select! {
            _ = sub_ctx.cancelled() => Err(ToolError::Cancelled),
            r = timeout(self.timeout, tool.execute(args, &sub_ctx)) => match r {
                Ok(Ok(content)) => Ok(content),
                Ok(Err(e)) => Err(ToolError::Failed(e)),
                Err(_) => Err(ToolError::Timeout(tool_name.to_string())),
            },
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Timeout(_)) => "timeout",
            Err(ToolError::Cancelled) => "cancelled",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
            "work_item": ctx.work_item_id(),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let output = match &result {
            Ok(content) => StepOutput::Text { text: content.clone() },
            Err(e) => StepOutput::Failed { error: e.to_string() },
        };
        sub_ctx.ended(Node::DelegateSubcall, tool_name, output);
        result
    }

    pub fn schema_json(&self) -> String {
        self.registry.to_schema_json()
    }
}

fn step_input(args: &Value) -> String {
    match args.get("query").and_then(Value::as_str) {
        Some(q) => q.to_string(),
        None => args.to_string(),
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

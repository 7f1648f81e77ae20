//! Tool Dispatch：执行一轮 decider 请求的工作项
//!
//! 调研项并发执行（TaskScheduler 限流），每项单独超时；结果按声明顺序返回，
//! 与完成先后无关。单项失败不终止会话，而是转为 failed 的 WorkResult 交给 decider 处理。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::core::{ExecutionContext, PlannerError, TaskScheduler, WorkItem, WorkKind};
use crate::react::events::{Node, StepOutput, HANDOFF, RESEARCHER};
use crate::tools::DelegatedCapability;

/// handoff 单独出现时的结果文本
pub const HANDOFF_ROUTED: &str = "Routing to composer...";
/// handoff 与调研同轮出现时，handoff 被推迟
pub const HANDOFF_DEFERRED: &str =
    "Handoff deferred: research in this round must finish first. Request call_planner again once you have the results.";

/// 一个工作项的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkResult {
    pub item_id: String,
    pub text: String,
    pub failed: bool,
}

impl WorkResult {
    fn ok(item_id: &str, text: impl Into<String>) -> Self {
        Self {
            item_id: item_id.to_string(),
            text: text.into(),
            failed: false,
        }
    }
}

pub struct ToolDispatch {
    delegate: Arc<dyn DelegatedCapability>,
    scheduler: TaskScheduler,
    item_timeout: Duration,
}

impl ToolDispatch {
    pub fn new(delegate: Arc<dyn DelegatedCapability>, scheduler: TaskScheduler, item_timeout: Duration) -> Self {
        Self {
            delegate,
            scheduler,
            item_timeout,
        }
    }

    /// 执行一批工作项，返回与 items 同序、一一对应的结果。
    /// 仅取消会以 Err 返回；委派失败与超时都体现在 WorkResult.failed
    pub async fn dispatch(
        &self,
        items: &[WorkItem],
        ctx: &ExecutionContext,
    ) -> Result<Vec<WorkResult>, PlannerError> {
        if items.is_empty() {
            return Err(PlannerError::MalformedOutput("empty dispatch batch".to_string()));
        }
        let total = items.iter().filter(|i| i.is_research()).count();
        let completed = AtomicUsize::new(0);
        info!(
            items = items.len(),
            research = total,
            limit = self.scheduler.max_concurrent(),
            "dispatching work items"
        );
        if total > 0 {
            ctx.status(format!("Researching {total} question(s)..."));
        }

        let runs = items.iter().map(|item| async {
            match item.kind {
                WorkKind::Research => self.run_research(item, ctx, &completed, total).await,
                WorkKind::Handoff if total > 0 => Ok(WorkResult::ok(&item.id, HANDOFF_DEFERRED)),
                WorkKind::Handoff => Ok(self.handoff(item, ctx)),
            }
        });
        join_all(runs).await.into_iter().collect()
    }

    /// 交接给 composer：记录事件并返回路由说明
    pub fn handoff(&self, item: &WorkItem, ctx: &ExecutionContext) -> WorkResult {
        let item_ctx = ctx.for_work_item(&item.id);
        item_ctx.started(Node::Dispatch, HANDOFF, "");
        item_ctx.ended(Node::Dispatch, HANDOFF, StepOutput::text(HANDOFF_ROUTED));
        WorkResult::ok(&item.id, HANDOFF_ROUTED)
    }

    async fn run_research(
        &self,
        item: &WorkItem,
        ctx: &ExecutionContext,
        completed: &AtomicUsize,
        total: usize,
    ) -> Result<WorkResult, PlannerError> {
        let _permit = tokio::select! {
            _ = ctx.cancelled() => return Err(PlannerError::Cancelled),
            permit = self.scheduler.acquire_research() => permit?,
        };
        let item_ctx = ctx.for_work_item(&item.id);
        item_ctx.started(Node::Dispatch, RESEARCHER, item.question.as_str());

        let outcome = tokio::select! {
            _ = item_ctx.cancelled() => Err(PlannerError::Cancelled),
            r = timeout(self.item_timeout, self.delegate.invoke(&item.question, &item_ctx)) => match r {
                Ok(result) => result,
                Err(_) => Err(PlannerError::CapabilityUnavailable(format!(
                    "{} timed out after {}s",
                    self.delegate.name(),
                    self.item_timeout.as_secs()
                ))),
            },
        };

        let result = match outcome {
            Ok(text) => {
                item_ctx.ended(Node::Dispatch, RESEARCHER, StepOutput::text(text.as_str()));
                WorkResult::ok(&item.id, text)
            }
            Err(PlannerError::Cancelled) => {
                item_ctx.ended(Node::Dispatch, RESEARCHER, StepOutput::failed("cancelled"));
                return Err(PlannerError::Cancelled);
            }
            Err(e) => {
                warn!(item = %item.id, error = %e, "research delegate failed");
                item_ctx.ended(Node::Dispatch, RESEARCHER, StepOutput::failed(e.reason()));
                WorkResult {
                    item_id: item.id.clone(),
                    text: format!(
                        "Research failed: {}. Try a narrower question or continue without this information.",
                        e.reason()
                    ),
                    failed: true,
                }
            }
        };

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.status(format!("Research progress: {done}/{total} complete"));
        Ok(result)
    }
}

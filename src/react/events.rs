//! 执行事件：decider / dispatch / 委派子调用 / composer 的开始、进度、结束
//!
//! 事件是扁平的，只携带逻辑节点标签与运行关联 id（可选父运行 id、所属工作项 id），
//! 由 timeline 模块重建为树。所有生产者共享同一个 EventSink（单个无界 mpsc 通道），
//! 发送顺序即全序，并发 dispatch 下聚合器也不会看到乱序。

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::WorkItem;

pub const DECIDER: &str = "decider";
pub const RESEARCHER: &str = "call_researcher";
pub const HANDOFF: &str = "call_planner";
pub const WEB_SEARCH: &str = "web_search";
pub const COMPOSER: &str = "composer";
pub const SESSION: &str = "session";

/// 逻辑节点标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// 会话级事件（状态行、终止）
    Session,
    Decider,
    /// Tool Dispatch：调研委派与 handoff
    Dispatch,
    /// 委派内部的查询能力（如 web_search）
    DelegateSubcall,
    Composer,
}

/// 步骤结束时的输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepOutput {
    Text { text: String },
    /// decider 的一轮输出：文本 + 请求的工作项
    Decision { text: String, items: Vec<WorkItem> },
    Failed { error: String },
}

impl StepOutput {
    pub fn text(text: impl Into<String>) -> Self {
        StepOutput::Text { text: text.into() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        StepOutput::Failed { error: error.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    StepStarted { input: String },
    StepProgressed { chunk: String },
    StepEnded { output: StepOutput },
    /// 瞬态状态行（调研进度、强制进入 composer 等）
    Status { text: String },
    /// 会话因致命错误或取消而终止
    SessionAborted { reason: String },
}

/// 单条执行事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub node: Node,
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_item_id: Option<String>,
    /// 产生事件的能力名（decider / call_researcher / web_search ...）
    pub capability: String,
    pub payload: EventPayload,
}

/// 事件出口：未接入前端时为空，emit 直接丢弃
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ExecutionEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// 创建 sink 与对应的接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: ExecutionEvent) {
        if let Some(tx) = &self.tx {
            // 接收端已关闭时静默丢弃：时间线是只读投影，不影响控制流
            let _ = tx.send(event);
        }
    }
}

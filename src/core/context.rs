//! 执行上下文：每次调用显式传递的关联 id、取消令牌与事件出口
//!
//! Dispatch -> Research -> web_search 每一层都拿到自己的 ExecutionContext 值，
//! 不读取任何进程级可变状态，因此多个调研条目可以安全并发。

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use crate::react::events::{EventPayload, EventSink, ExecutionEvent, Node, StepOutput, SESSION};

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    session_id: Uuid,
    run_id: Uuid,
    parent_run_id: Option<Uuid>,
    work_item_id: Option<String>,
    cancel: CancellationToken,
    sink: EventSink,
}

impl ExecutionContext {
    /// 会话根上下文
    pub fn root(session_id: Uuid, sink: EventSink, cancel: CancellationToken) -> Self {
        Self {
            session_id,
            run_id: Uuid::new_v4(),
            parent_run_id: None,
            work_item_id: None,
            cancel,
            sink,
        }
    }

    /// 子运行：新 run id，父 run id 指向当前运行，继承所属工作项
    pub fn child(&self) -> Self {
        Self {
            session_id: self.session_id,
            run_id: Uuid::new_v4(),
            parent_run_id: Some(self.run_id),
            work_item_id: self.work_item_id.clone(),
            cancel: self.cancel.child_token(),
            sink: self.sink.clone(),
        }
    }

    /// 为某个工作项派生子运行，其下所有事件都回显该工作项 id
    pub fn for_work_item(&self, item_id: impl Into<String>) -> Self {
        let mut ctx = self.child();
        ctx.work_item_id = Some(item_id.into());
        ctx
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn parent_run_id(&self) -> Option<Uuid> {
        self.parent_run_id
    }

    pub fn work_item_id(&self) -> Option<&str> {
        self.work_item_id.as_deref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn emit(&self, node: Node, capability: &str, payload: EventPayload) {
        self.sink.emit(ExecutionEvent {
            node,
            run_id: self.run_id,
            parent_run_id: self.parent_run_id,
            work_item_id: self.work_item_id.clone(),
            capability: capability.to_string(),
            payload,
        });
    }

    pub fn started(&self, node: Node, capability: &str, input: impl Into<String>) {
        self.emit(node, capability, EventPayload::StepStarted { input: input.into() });
    }

    pub fn progressed(&self, node: Node, capability: &str, chunk: impl Into<String>) {
        self.emit(node, capability, EventPayload::StepProgressed { chunk: chunk.into() });
    }

    pub fn ended(&self, node: Node, capability: &str, output: StepOutput) {
        self.emit(node, capability, EventPayload::StepEnded { output });
    }

    /// 会话级瞬态状态行
    pub fn status(&self, text: impl Into<String>) {
        self.emit(Node::Session, SESSION, EventPayload::Status { text: text.into() });
    }

    pub fn aborted(&self, reason: impl Into<String>) {
        self.emit(Node::Session, SESSION, EventPayload::SessionAborted { reason: reason.into() });
    }
}

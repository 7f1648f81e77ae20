//! 会话监管：取消令牌与根执行上下文
//!
//! 前端放弃会话时调用 cancel()；令牌经 ExecutionContext 逐层下传，
//! 状态机在每次转移前、Dispatch 与调研在每次能力调用前检查，停止继续调用外部能力。

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::ExecutionContext;
use crate::react::events::EventSink;

#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 放弃会话
    pub fn cancel(&self) {
        tracing::info!("session cancellation requested");
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 为会话创建根执行上下文，取消信号与本监管器绑定
    pub fn root_context(&self, session_id: Uuid, sink: EventSink) -> ExecutionContext {
        ExecutionContext::root(session_id, sink, self.cancel_token.child_token())
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

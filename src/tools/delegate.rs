//! 委派能力：接收一个自然语言问题，返回文本答案
//!
//! 调研子智能体实现此 trait；Tool Dispatch 只依赖 trait，测试中可替换为脚本化实现。

use async_trait::async_trait;

use crate::core::{ExecutionContext, PlannerError};

#[async_trait]
pub trait DelegatedCapability: Send + Sync {
    fn name(&self) -> &str;

    /// 回答一个问题。ctx 已绑定所属工作项，内部子调用的事件都挂在它下面
    async fn invoke(&self, question: &str, ctx: &ExecutionContext) -> Result<String, PlannerError>;
}

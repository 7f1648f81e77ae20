//! 状态机阶段：Deciding -> {Dispatching, Composing}，Dispatching -> Deciding，Composing -> Done

use crate::core::{WorkItem, WorkKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Deciding,
    /// 本轮 decider 请求的全部工作项（含被推迟的 handoff）
    Dispatching(Vec<WorkItem>),
    Composing,
    Done,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Deciding => "deciding",
            Phase::Dispatching(_) => "dispatching",
            Phase::Composing => "composing",
            Phase::Done => "done",
        }
    }
}

/// 根据一轮 decider 输出决定下一阶段
///
/// 只要存在调研项就先调研，handoff 仅在没有任何调研项时生效。
pub fn next_phase(items: &[WorkItem]) -> Phase {
    if items.is_empty() {
        Phase::Deciding
    } else if items.iter().any(|i| i.kind == WorkKind::Research) {
        Phase::Dispatching(items.to_vec())
    } else {
        Phase::Composing
    }
}

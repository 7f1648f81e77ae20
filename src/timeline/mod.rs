//! 时间线：执行事件流的只读投影与展示出口

pub mod aggregator;
pub mod render;

pub use aggregator::{
    project, project_with, Aggregator, ItemStatus, SubStepEntry, Terminal, Timeline, TimelineEntry,
    WorkItemEntry, DEFAULT_PREVIEW_CHARS,
};
pub use render::{TerminalRenderer, TimelineSink};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::react::events::ExecutionEvent;

/// 消费事件流直到所有发送端关闭；每个事件之后把当前快照交给 sink。
/// 返回最终时间线与完整事件日志
pub async fn drive_timeline(
    mut events: UnboundedReceiver<ExecutionEvent>,
    sink: &mut dyn TimelineSink,
    preview_chars: usize,
) -> (Timeline, Vec<ExecutionEvent>) {
    let mut aggregator = Aggregator::new(preview_chars);
    let mut log = Vec::new();
    while let Some(event) = events.recv().await {
        aggregator.apply(&event);
        sink.render(aggregator.timeline());
        log.push(event);
    }
    (aggregator.into_timeline(), log)
}

//! 事件流聚合器：把扁平的 ExecutionEvent 序列重建为可渲染的时间线
//!
//! 只读投影，不影响控制流。条目只追加不删除，顺序等于首次出现顺序；对同一事件日志
//! 重新投影得到完全相同的结构。

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::react::events::{
    EventPayload, ExecutionEvent, Node, StepOutput, HANDOFF, RESEARCHER,
};

/// 子步骤结果默认预览长度
pub const DEFAULT_PREVIEW_CHARS: usize = 300;
/// 子步骤标签中查询文本的最大字符数
const LABEL_QUERY_CHARS: usize = 70;

const COMPOSING_STATUS: &str = "Creating your personalized travel plan...";
const READY_STATUS: &str = "Plan ready!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    /// 已被一次委派调用认领
    Running,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubStepEntry {
    #[serde(skip)]
    pub run_id: Uuid,
    pub label: String,
    pub done: bool,
    pub failed: bool,
    /// 截断后的结果
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItemEntry {
    pub id: String,
    pub question: String,
    pub status: ItemStatus,
    pub sub_steps: Vec<SubStepEntry>,
    pub result: Option<String>,
    /// 委派调用失败标记
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEntry {
    AssistantText { text: String },
    WorkItem(WorkItemEntry),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Terminal {
    #[default]
    Running,
    Completed,
    Aborted { reason: String },
}

/// 时间线快照：永久条目 + 瞬态状态行 / 方案预览 + 终态投影
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
    pub status: Option<String>,
    /// composer 流式输出的拼接，composer 结束后清空
    pub preview: Option<String>,
    pub final_artifact: Option<String>,
    pub terminal: Terminal,
}

impl Timeline {
    pub fn work_items(&self) -> impl Iterator<Item = &WorkItemEntry> {
        self.entries.iter().filter_map(|e| match e {
            TimelineEntry::WorkItem(item) => Some(item),
            _ => None,
        })
    }

    pub fn assistant_texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            TimelineEntry::AssistantText { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// 单消费者聚合器
#[derive(Debug)]
pub struct Aggregator {
    timeline: Timeline,
    preview_chars: usize,
    /// 委派运行 id -> 条目下标
    claims: HashMap<Uuid, usize>,
    /// 仍在进行的认领，按认领顺序
    active: Vec<usize>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_CHARS)
    }
}

impl Aggregator {
    pub fn new(preview_chars: usize) -> Self {
        Self {
            timeline: Timeline::default(),
            preview_chars,
            claims: HashMap::new(),
            active: Vec::new(),
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn into_timeline(self) -> Timeline {
        self.timeline
    }

    pub fn apply(&mut self, event: &ExecutionEvent) {
        match (event.node, &event.payload) {
            (Node::Decider, EventPayload::StepEnded { output }) => self.on_decider_end(output),
            (Node::Dispatch, EventPayload::StepStarted { .. }) if event.capability == RESEARCHER => {
                self.claim(event)
            }
            (Node::Dispatch, EventPayload::StepEnded { output }) if event.capability == RESEARCHER => {
                self.release(event, output)
            }
            (Node::Dispatch, EventPayload::StepEnded { .. }) if event.capability == HANDOFF => {
                self.timeline.status = Some(COMPOSING_STATUS.to_string());
            }
            (Node::DelegateSubcall, EventPayload::StepStarted { input }) => self.sub_step_started(event, input),
            (Node::DelegateSubcall, EventPayload::StepEnded { output }) => self.sub_step_ended(event, output),
            (Node::Composer, EventPayload::StepStarted { .. }) => {
                self.timeline.status = Some(COMPOSING_STATUS.to_string());
            }
            (Node::Composer, EventPayload::StepProgressed { chunk }) => {
                self.timeline
                    .preview
                    .get_or_insert_with(String::new)
                    .push_str(chunk);
            }
            (Node::Composer, EventPayload::StepEnded { output }) => {
                self.timeline.preview = None;
                if let StepOutput::Text { text } = output {
                    self.timeline.final_artifact = Some(text.clone());
                    self.timeline.terminal = Terminal::Completed;
                    self.timeline.status = Some(READY_STATUS.to_string());
                }
            }
            (_, EventPayload::Status { text }) => self.timeline.status = Some(text.clone()),
            (_, EventPayload::SessionAborted { reason }) => {
                self.timeline.preview = None;
                self.timeline.terminal = Terminal::Aborted { reason: reason.clone() };
            }
            _ => {}
        }
    }

    fn on_decider_end(&mut self, output: &StepOutput) {
        match output {
            StepOutput::Decision { text, items } => {
                self.push_text(text);
                for item in items.iter().filter(|i| i.is_research()) {
                    self.timeline.entries.push(TimelineEntry::WorkItem(WorkItemEntry {
                        id: item.id.clone(),
                        question: item.question.clone(),
                        status: ItemStatus::Pending,
                        sub_steps: Vec::new(),
                        result: None,
                        failed: false,
                    }));
                }
            }
            StepOutput::Text { text } => self.push_text(text),
            StepOutput::Failed { .. } => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.timeline.entries.push(TimelineEntry::AssistantText {
                text: text.to_string(),
            });
        }
    }

    fn item_mut(&mut self, idx: usize) -> Option<&mut WorkItemEntry> {
        match self.timeline.entries.get_mut(idx) {
            Some(TimelineEntry::WorkItem(item)) => Some(item),
            _ => None,
        }
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.timeline.entries.iter().position(|e| match e {
            TimelineEntry::WorkItem(item) => item.id == id,
            _ => false,
        })
    }

    /// 委派开始：有 work_item_id 时直接关联，否则认领最早的未认领条目
    fn claim(&mut self, event: &ExecutionEvent) {
        let target = match event.work_item_id.as_deref() {
            Some(id) => self.index_of(id),
            None => self.timeline.entries.iter().position(|e| {
                matches!(e, TimelineEntry::WorkItem(item) if item.status == ItemStatus::Pending)
            }),
        };
        let Some(idx) = target else {
            warn!(run_id = %event.run_id, work_item = ?event.work_item_id, "delegate start without a pending work item, ignored");
            return;
        };
        if let Some(item) = self.item_mut(idx) {
            if item.status != ItemStatus::Pending {
                warn!(item = %item.id, "work item claimed twice, ignored");
                return;
            }
            item.status = ItemStatus::Running;
        }
        self.claims.insert(event.run_id, idx);
        self.active.push(idx);
    }

    fn release(&mut self, event: &ExecutionEvent, output: &StepOutput) {
        let idx = self
            .claims
            .remove(&event.run_id)
            .or_else(|| event.work_item_id.as_deref().and_then(|id| self.index_of(id)));
        let Some(idx) = idx else {
            warn!(run_id = %event.run_id, "delegate end for an unknown run, ignored");
            return;
        };
        self.active.retain(|&i| i != idx);
        if let Some(item) = self.item_mut(idx) {
            item.status = ItemStatus::Done;
            match output {
                StepOutput::Failed { error } => {
                    item.failed = true;
                    item.result = Some(error.clone());
                }
                other => item.result = Some(output_text(other)),
            }
        }
    }

    /// 子步骤归属：work_item_id，其次父运行 id，最后是最近一次仍在进行的认领
    fn owner_of(&self, event: &ExecutionEvent) -> Option<usize> {
        if let Some(id) = event.work_item_id.as_deref() {
            return self.index_of(id);
        }
        event
            .parent_run_id
            .and_then(|parent| self.claims.get(&parent).copied())
            .or_else(|| self.active.last().copied())
    }

    fn sub_step_started(&mut self, event: &ExecutionEvent, input: &str) {
        let Some(idx) = self.owner_of(event) else {
            warn!(run_id = %event.run_id, "sub-step without an owning work item, ignored");
            return;
        };
        if let Some(item) = self.item_mut(idx) {
            item.sub_steps.push(SubStepEntry {
                run_id: event.run_id,
                label: format!("🔍 {}", truncate(input, LABEL_QUERY_CHARS, "")),
                done: false,
                failed: false,
                result: None,
            });
        }
    }

    fn sub_step_ended(&mut self, event: &ExecutionEvent, output: &StepOutput) {
        let preview_chars = self.preview_chars;
        let step = self
            .owner_of(event)
            .and_then(|idx| self.item_mut(idx))
            .and_then(|item| item.sub_steps.iter_mut().find(|s| s.run_id == event.run_id));
        let Some(step) = step else {
            warn!(run_id = %event.run_id, "sub-step end for an unknown run, ignored");
            return;
        };
        step.done = true;
        step.failed = matches!(output, StepOutput::Failed { .. });
        let text = output_text(output);
        if !text.is_empty() {
            step.result = Some(truncate(&text, preview_chars, "..."));
        }
    }
}

fn output_text(output: &StepOutput) -> String {
    match output {
        StepOutput::Text { text } | StepOutput::Decision { text, .. } => text.clone(),
        StepOutput::Failed { error } => error.clone(),
    }
}

fn truncate(s: &str, max_chars: usize, suffix: &str) -> String {
    if s.chars().count() > max_chars {
        format!("{}{}", s.chars().take(max_chars).collect::<String>(), suffix)
    } else {
        s.to_string()
    }
}

/// 纯函数：从完整事件日志投影出时间线
pub fn project(events: &[ExecutionEvent]) -> Timeline {
    project_with(events, DEFAULT_PREVIEW_CHARS)
}

pub fn project_with(events: &[ExecutionEvent], preview_chars: usize) -> Timeline {
    let mut aggregator = Aggregator::new(preview_chars);
    for event in events {
        aggregator.apply(event);
    }
    aggregator.into_timeline()
}

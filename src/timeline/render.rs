//! 展示层出口：TimelineSink 接收时间线快照；TerminalRenderer 以追加方式输出到终端
//!
//! 同一快照重复渲染不会重复输出：每一行以稳定的键记录是否已打印。

use std::collections::HashSet;
use std::io::Write;

use crate::timeline::{ItemStatus, Terminal, Timeline, TimelineEntry};

/// 接收时间线快照的展示层
pub trait TimelineSink {
    fn render(&mut self, timeline: &Timeline);
}

impl<F: FnMut(&Timeline)> TimelineSink for F {
    fn render(&mut self, timeline: &Timeline) {
        self(timeline)
    }
}

/// 终端渲染器：只输出新出现或状态变化的行，方案预览按增量写出
pub struct TerminalRenderer<W: Write> {
    out: W,
    printed: HashSet<String>,
    preview_written: usize,
    last_status: Option<String>,
}

impl TerminalRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: HashSet::new(),
            preview_written: 0,
            last_status: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, key: String, text: String) {
        if self.printed.insert(key) {
            let _ = writeln!(self.out, "{text}");
        }
    }

    fn entries(&mut self, timeline: &Timeline) {
        for (i, entry) in timeline.entries.iter().enumerate() {
            match entry {
                TimelineEntry::AssistantText { text } => self.line(format!("text:{i}"), format!("💬 {text}")),
                TimelineEntry::WorkItem(item) => {
                    self.line(format!("item:{}", item.id), format!("🔍 {}", item.question));
                    for (j, step) in item.sub_steps.iter().enumerate() {
                        self.line(format!("sub:{}:{j}", item.id), format!("   🔄 {}", step.label));
                        if step.done {
                            let icon = if step.failed { "❌" } else { "✅" };
                            self.line(format!("sub-done:{}:{j}", item.id), format!("   {icon} {}", step.label));
                        }
                    }
                    if item.status == ItemStatus::Done {
                        let marker = if item.failed { "❌ failed" } else { "✅ done" };
                        self.line(format!("item-done:{}", item.id), format!("{marker}: {}", item.question));
                    }
                }
            }
        }
    }

    fn preview(&mut self, timeline: &Timeline) {
        if let Some(preview) = &timeline.preview {
            if preview.len() > self.preview_written {
                let _ = write!(self.out, "{}", &preview[self.preview_written..]);
                let _ = self.out.flush();
                self.preview_written = preview.len();
            }
        }
    }
}

impl<W: Write> TimelineSink for TerminalRenderer<W> {
    fn render(&mut self, timeline: &Timeline) {
        self.entries(timeline);
        if timeline.status != self.last_status {
            if let Some(status) = &timeline.status {
                let _ = writeln!(self.out, "· {status}");
            }
            self.last_status = timeline.status.clone();
        }
        self.preview(timeline);
        match &timeline.terminal {
            Terminal::Running => {}
            Terminal::Completed => {
                if self.preview_written > 0 {
                    self.line("preview-end".to_string(), String::new());
                }
                self.line("terminal".to_string(), "✅ Plan ready!".to_string());
            }
            Terminal::Aborted { reason } => self.line("terminal".to_string(), format!("⛔ Aborted: {reason}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{SubStepEntry, WorkItemEntry};
    use uuid::Uuid;

    fn timeline() -> Timeline {
        Timeline {
            entries: vec![
                TimelineEntry::AssistantText { text: "Checking flights.".into() },
                TimelineEntry::WorkItem(WorkItemEntry {
                    id: "1".into(),
                    question: "flights".into(),
                    status: ItemStatus::Done,
                    sub_steps: vec![SubStepEntry {
                        run_id: Uuid::nil(),
                        label: "🔍 MUC NRT".into(),
                        done: true,
                        failed: false,
                        result: Some("r".into()),
                    }],
                    result: Some("ok".into()),
                    failed: false,
                }),
            ],
            status: Some("Research progress: 1/1 complete".into()),
            preview: Some("# Plan".into()),
            final_artifact: None,
            terminal: Terminal::Running,
        }
    }

    #[test]
    fn test_rerender_is_idempotent() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        let t = timeline();
        renderer.render(&t);
        renderer.render(&t);
        let out = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(out.matches("💬 Checking flights.").count(), 1);
        assert_eq!(out.matches("✅ done: flights").count(), 1);
        assert_eq!(out.matches("· Research progress").count(), 1);
        assert_eq!(out.matches("# Plan").count(), 1);
    }

    #[test]
    fn test_preview_written_incrementally() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        let mut t = Timeline {
            preview: Some("Day 1".into()),
            ..Timeline::default()
        };
        renderer.render(&t);
        t.preview = Some("Day 1: Belem".into());
        renderer.render(&t);
        let out = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(out, "Day 1: Belem");
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = 0;
        {
            let mut sink = |_: &Timeline| seen += 1;
            sink.render(&Timeline::default());
        }
        assert_eq!(seen, 1);
    }
}

//! 会话：只追加的消息历史 + 补全后的行程参数 + 轮次计数
//!
//! 一个 Session 只被一个运行中的状态机实例独占；实例结束或放弃时随之销毁。

use std::collections::{HashMap, HashSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::ResolvedTrip;
use crate::llm::ChatMessage;

/// 工作项类型：委派调研，或交接给 composer 的控制信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    Research,
    Handoff,
}

impl WorkKind {
    /// decider 调用格式中的工具名
    pub fn tool_name(&self) -> &'static str {
        match self {
            WorkKind::Research => "call_researcher",
            WorkKind::Handoff => "call_planner",
        }
    }
}

/// decider 请求的工作项；id 在会话内唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub kind: WorkKind,
    /// 调研问题；handoff 为空
    pub question: String,
}

impl WorkItem {
    pub fn research(id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: WorkKind::Research,
            question: question.into(),
        }
    }

    pub fn handoff(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: WorkKind::Handoff,
            question: String::new(),
        }
    }

    pub fn is_research(&self) -> bool {
        self.kind == WorkKind::Research
    }
}

/// 会话历史中的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    UserTurn {
        text: String,
    },
    DeciderTurn {
        text: String,
        items: Vec<WorkItem>,
    },
    WorkResult {
        item_id: String,
        text: String,
        /// 委派调用失败时为 true，text 中携带失败说明
        failed: bool,
    },
    /// composer 产出的最终产物
    ComposerTurn {
        text: String,
    },
}

/// 单个会话的全部状态
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub trip: ResolvedTrip,
    messages: Vec<Message>,
    /// 已完成的非终止 decider 轮次（普通回合 + 调研回合）
    rounds: usize,
    finished: bool,
    issued_ids: HashSet<String>,
    next_item: u64,
}

impl Session {
    /// 以行程参数与一条种子用户消息创建会话
    pub fn new(trip: ResolvedTrip, seed: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip,
            messages: vec![Message::UserTurn { text: seed.into() }],
            rounds: 0,
            finished: false,
            issued_ids: HashSet::new(),
            next_item: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn complete_round(&mut self) {
        self.rounds += 1;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 为新工作项分配 id：沿用 decider 给出的 id，缺失或重复时生成 item-<n>
    pub fn assign_item_id(&mut self, proposed: Option<&str>) -> String {
        let proposed = proposed.map(str::trim).filter(|s| !s.is_empty());
        let id = match proposed {
            Some(id) if !self.issued_ids.contains(id) => id.to_string(),
            _ => loop {
                self.next_item += 1;
                let candidate = format!("item-{}", self.next_item);
                if !self.issued_ids.contains(&candidate) {
                    break candidate;
                }
            },
        };
        self.issued_ids.insert(id.clone());
        id
    }

    pub fn push_decider_turn(&mut self, text: String, items: Vec<WorkItem>) {
        self.messages.push(Message::DeciderTurn { text, items });
    }

    pub fn push_result(&mut self, item_id: impl Into<String>, text: impl Into<String>, failed: bool) {
        self.messages.push(Message::WorkResult {
            item_id: item_id.into(),
            text: text.into(),
            failed,
        });
    }

    /// 追加 composer 产物并标记会话结束
    pub fn finish(&mut self, artifact: String) {
        self.messages.push(Message::ComposerTurn { text: artifact });
        self.finished = true;
    }

    pub fn artifact(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::ComposerTurn { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// 将会话历史规范化为 LLM 消息（不含 system 指令）
    pub fn to_llm_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(to_chat_message).collect()
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    match message {
        Message::UserTurn { text } => ChatMessage::user(text.clone()),
        Message::DeciderTurn { text, items } if items.is_empty() => ChatMessage::assistant(text.clone()),
        Message::DeciderTurn { text, items } => {
            let calls: Vec<serde_json::Value> = items
                .iter()
                .map(|item| match item.kind {
                    WorkKind::Research => serde_json::json!({
                        "id": item.id,
                        "tool": item.kind.tool_name(),
                        "args": { "question": item.question },
                    }),
                    WorkKind::Handoff => serde_json::json!({
                        "id": item.id,
                        "tool": item.kind.tool_name(),
                        "args": {},
                    }),
                })
                .collect();
            let block = serde_json::json!({ "tool_calls": calls });
            let content = if text.trim().is_empty() {
                format!("```json\n{block}\n```")
            } else {
                format!("{}\n\n```json\n{block}\n```", text.trim())
            };
            ChatMessage::assistant(content)
        }
        Message::WorkResult { item_id, text, .. } => {
            ChatMessage::user(format!("Result for {item_id}:\n{text}"))
        }
        Message::ComposerTurn { text } => ChatMessage::assistant(text.clone()),
    }
}

/// 校验工作项与结果的一一对应：每个 WorkResult 对应恰好一个先前请求的工作项，
/// 且每个工作项在下一个 DeciderTurn 之前得到结果
pub fn check_item_pairing(messages: &[Message]) -> Result<(), String> {
    let mut requested: HashMap<&str, usize> = HashMap::new();
    let mut answered: HashSet<&str> = HashSet::new();
    let mut outstanding: Vec<&str> = Vec::new();

    for message in messages {
        match message {
            Message::DeciderTurn { items, .. } => {
                if let Some(id) = outstanding.first() {
                    return Err(format!("item {id} has no result before the next decider turn"));
                }
                for item in items {
                    let seen = requested.entry(item.id.as_str()).or_insert(0);
                    *seen += 1;
                    if *seen > 1 {
                        return Err(format!("item id {} issued twice", item.id));
                    }
                    outstanding.push(item.id.as_str());
                }
            }
            Message::WorkResult { item_id, .. } => {
                if !requested.contains_key(item_id.as_str()) {
                    return Err(format!("result for unknown item {item_id}"));
                }
                if !answered.insert(item_id.as_str()) {
                    return Err(format!("item {item_id} answered twice"));
                }
                outstanding.retain(|id| *id != item_id.as_str());
            }
            Message::UserTurn { .. } | Message::ComposerTurn { .. } => {}
        }
    }

    match outstanding.first() {
        Some(id) => Err(format!("item {id} left without a result")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TripParams;
    use crate::llm::Role;
    use chrono::NaiveDate;

    fn session() -> Session {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let trip = TripParams::new("Munich", "Tokyo").resolve(today).unwrap();
        Session::new(trip, "Plan my trip")
    }

    #[test]
    fn test_assign_item_id_keeps_unique_proposals() {
        let mut s = session();
        assert_eq!(s.assign_item_id(Some("toolu_1")), "toolu_1");
        assert_eq!(s.assign_item_id(Some("toolu_1")), "item-1");
        assert_eq!(s.assign_item_id(None), "item-2");
        assert_eq!(s.assign_item_id(Some("  ")), "item-3");
    }

    #[test]
    fn test_assign_item_id_skips_generated_collisions() {
        let mut s = session();
        assert_eq!(s.assign_item_id(Some("item-1")), "item-1");
        assert_eq!(s.assign_item_id(None), "item-2");
    }

    #[test]
    fn test_llm_messages_render_calls_and_results() {
        let mut s = session();
        s.push_decider_turn(String::new(), vec![WorkItem::research("1", "flights")]);
        s.push_result("1", "LH714 at 900 USD", false);
        let msgs = s.to_llm_messages();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[1].role, Role::Assistant);
        assert!(msgs[1].content.contains("call_researcher"));
        assert!(msgs[1].content.contains("flights"));
        assert_eq!(msgs[2].role, Role::User);
        assert!(msgs[2].content.starts_with("Result for 1:"));
    }

    #[test]
    fn test_pairing_detects_missing_result() {
        let messages = vec![
            Message::DeciderTurn {
                text: String::new(),
                items: vec![WorkItem::research("1", "flights")],
            },
            Message::DeciderTurn {
                text: String::new(),
                items: vec![],
            },
        ];
        assert!(check_item_pairing(&messages).is_err());
    }

    #[test]
    fn test_pairing_detects_unknown_result() {
        let messages = vec![Message::WorkResult {
            item_id: "ghost".to_string(),
            text: String::new(),
            failed: false,
        }];
        assert!(check_item_pairing(&messages).is_err());
    }

    #[test]
    fn test_finish_records_artifact() {
        let mut s = session();
        s.finish("# Tokyo".to_string());
        assert!(s.is_finished());
        assert_eq!(s.artifact(), Some("# Tokyo"));
    }
}

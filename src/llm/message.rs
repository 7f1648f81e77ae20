//! LLM 消息格式与内容规范化
//!
//! 不同后端返回的内容形状不同（纯字符串 / content block 数组）；
//! 在适配器边界统一转为一段文本，下游组件不再按形状分支。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 把任意形状的消息内容规范化为文本：
/// 字符串原样返回；数组取所有 text block 以换行拼接；带 text 字段的对象取 text
pub fn normalize_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                Value::String(s) => Some(s.clone()),
                Value::Object(map) => {
                    let is_text = map
                        .get("type")
                        .and_then(Value::as_str)
                        .map_or(true, |t| t == "text");
                    if is_text {
                        map.get("text").and_then(Value::as_str).map(String::from)
                    } else {
                        None
                    }
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map
            .get("text")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_default(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 拆出 system 指令并合并相邻同角色消息（Anthropic 要求 user/assistant 交替）
pub fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<ChatMessage>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut merged: Vec<ChatMessage> = Vec::new();
    for msg in messages {
        if msg.role == Role::System {
            system_parts.push(msg.content.as_str());
            continue;
        }
        match merged.last_mut() {
            Some(last) if last.role == msg.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&msg.content);
            }
            _ => merged.push(msg.clone()),
        }
    }
    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, merged)
}

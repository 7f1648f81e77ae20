//! Decider：读取会话历史，决定继续思考、委派调研或交给 composer
//!
//! LLM 输出为文本 + 至多一个 JSON 块（```json 围栏或裸 JSON）。parse_decider_output 把 JSON 块
//! 解析为工作项请求，块外文本作为本轮的文本；parse_tool_call 是调研子智能体使用的单调用版本。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::{ExecutionContext, PlannerError, ResolvedTrip, Session, WorkItem, WorkKind};
use crate::llm::{ChatMessage, LlmClient};
use crate::react::events::{Node, StepOutput, DECIDER, HANDOFF, RESEARCHER};
use crate::tools::decider_call_schema_json;

/// LLM 返回的单个工具调用：{"tool": "...", "args": {...}}，兼容 name / input 写法
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "name")]
    pub tool: String,
    #[serde(default, alias = "input")]
    pub args: Value,
}

/// decider 请求的工作项（id 尚未分配）
#[derive(Debug, Clone, PartialEq)]
pub struct RequestedItem {
    pub id: Option<String>,
    pub kind: WorkKind,
    pub question: String,
}

/// 解析后的 decider 回合
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTurn {
    pub text: String,
    pub requested: Vec<RequestedItem>,
}

/// 从输出中找到的 JSON 块
struct JsonBlock {
    value: Value,
    /// 块外的文本
    rest: String,
    fenced: bool,
}

/// 提取 JSON 块。围栏块必须能解析，否则报错；裸 JSON 取第一个可解析且具有调用结构的值，没有则视为普通文本
fn extract_json_block(output: &str) -> Result<Option<JsonBlock>, String> {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let body_start = start + "```json".len();
        let rest = &trimmed[body_start..];
        let (body, after) = match rest.find("```") {
            Some(end) => (&rest[..end], &rest[end + 3..]),
            None => (rest, ""),
        };
        let value: Value = serde_json::from_str(body.trim())
            .map_err(|e| format!("{}: {}", e, body.trim()))?;
        let text = format!("{}\n{}", trimmed[..start].trim(), after.trim());
        return Ok(Some(JsonBlock {
            value,
            rest: text.trim().to_string(),
            fenced: true,
        }));
    }

    // 裸 JSON：从每个 { / [ 起尝试解析，取第一个具有调用结构的值
    for (start, _) in trimmed.match_indices(['{', '[']) {
        let mut stream = serde_json::Deserializer::from_str(&trimmed[start..]).into_iter::<Value>();
        let Some(Ok(value)) = stream.next() else {
            continue;
        };
        if !looks_like_calls(&value) {
            continue;
        }
        let end = start + stream.byte_offset();
        let text = format!("{}\n{}", trimmed[..start].trim(), trimmed[end..].trim());
        return Ok(Some(JsonBlock {
            value,
            rest: text.trim().to_string(),
            fenced: false,
        }));
    }
    Ok(None)
}

/// JSON 值是否具有调用结构（含 tool / name / tool_calls 键）
fn looks_like_calls(value: &Value) -> bool {
    let is_call = |v: &Value| v.get("tool").is_some() || v.get("name").is_some();
    match value {
        Value::Object(map) => map.contains_key("tool_calls") || is_call(value),
        Value::Array(items) => !items.is_empty() && items.iter().all(is_call),
        _ => false,
    }
}

fn calls_from_value(value: Value) -> Result<Vec<ToolCall>, String> {
    let list = match value {
        Value::Object(mut map) if map.contains_key("tool_calls") => {
            map.remove("tool_calls").unwrap_or(Value::Null)
        }
        obj @ Value::Object(_) => Value::Array(vec![obj]),
        arr @ Value::Array(_) => arr,
        other => return Err(format!("expected a tool call object or array, got {other}")),
    };
    serde_json::from_value(list).map_err(|e| format!("invalid tool call: {e}"))
}

fn requested_item(call: ToolCall) -> Result<RequestedItem, PlannerError> {
    match call.tool.as_str() {
        RESEARCHER => {
            let question = call
                .args
                .get("question")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .ok_or_else(|| {
                    PlannerError::MalformedOutput(format!("{RESEARCHER} requires a non-blank question"))
                })?;
            Ok(RequestedItem {
                id: call.id,
                kind: WorkKind::Research,
                question: question.to_string(),
            })
        }
        HANDOFF => Ok(RequestedItem {
            id: call.id,
            kind: WorkKind::Handoff,
            question: String::new(),
        }),
        other => Err(PlannerError::MalformedOutput(format!("unknown work item kind: {other}"))),
    }
}

/// 解析 decider 输出
pub fn parse_decider_output(output: &str) -> Result<ParsedTurn, PlannerError> {
    let block = extract_json_block(output).map_err(PlannerError::MalformedOutput)?;
    let block = match block {
        Some(b) if b.fenced || looks_like_calls(&b.value) => b,
        _ => {
            return Ok(ParsedTurn {
                text: output.trim().to_string(),
                requested: Vec::new(),
            })
        }
    };
    let calls = calls_from_value(block.value).map_err(PlannerError::MalformedOutput)?;
    let requested = calls
        .into_iter()
        .map(requested_item)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParsedTurn {
        text: block.rest,
        requested,
    })
}

/// 解析调研子智能体的单步输出：含工具调用则返回 Some，纯文本答案返回 None
pub fn parse_tool_call(output: &str) -> Result<Option<ToolCall>, String> {
    let block = match extract_json_block(output)? {
        Some(b) if looks_like_calls(&b.value) => b,
        Some(b) if b.fenced => return Err(format!("JSON block is not a tool call: {}", b.value)),
        _ => return Ok(None),
    };
    let mut calls = calls_from_value(block.value)?;
    match calls.len() {
        0 => Ok(None),
        1 => Ok(calls.pop()),
        n => Err(format!("expected one tool call per step, got {n}")),
    }
}

/// decider 一轮的结果（id 已分配）
#[derive(Debug, Clone, PartialEq)]
pub struct DeciderOutput {
    pub text: String,
    pub items: Vec<WorkItem>,
}

/// Decider：持有 LLM 与基础指令，每轮拼接行程要求与调用格式后调用 LLM
pub struct Decider {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Decider {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    /// 由行程参数派生的完整指令
    pub fn directive(&self, trip: &ResolvedTrip) -> String {
        format!(
            "{}\n\n{}\n\n## Work item format\nTo delegate research or hand off, append one ```json block matching this schema:\n{}\n\nUse `{}` with {{\"question\": \"...\"}} for each research question, and `{}` alone once the research is sufficient.",
            self.system_prompt,
            trip.requirements_section(),
            decider_call_schema_json(),
            RESEARCHER,
            HANDOFF,
        )
    }

    /// 执行一轮决策：发出 decider 事件，为工作项分配会话内唯一 id
    pub async fn decide(
        &self,
        session: &mut Session,
        ctx: &ExecutionContext,
    ) -> Result<DeciderOutput, PlannerError> {
        if ctx.is_cancelled() {
            return Err(PlannerError::Cancelled);
        }
        let step = ctx.child();
        step.started(Node::Decider, DECIDER, "");

        let mut messages = vec![ChatMessage::system(self.directive(&session.trip))];
        messages.extend(session.to_llm_messages());

        let parsed: Result<ParsedTurn, PlannerError> = async {
            let output = tokio::select! {
                _ = step.cancelled() => return Err(PlannerError::Cancelled),
                r = self.llm.complete(&messages) => r?,
            };
            debug!(chars = output.len(), "decider output");
            parse_decider_output(&output)
        }
        .await;

        let parsed = match parsed {
            Ok(p) => p,
            Err(e) => {
                step.ended(Node::Decider, DECIDER, StepOutput::failed(e.reason()));
                return Err(e);
            }
        };

        let items: Vec<WorkItem> = parsed
            .requested
            .into_iter()
            .map(|r| {
                let id = session.assign_item_id(r.id.as_deref());
                WorkItem {
                    id,
                    kind: r.kind,
                    question: r.question,
                }
            })
            .collect();
        step.ended(
            Node::Decider,
            DECIDER,
            StepOutput::Decision {
                text: parsed.text.clone(),
                items: items.clone(),
            },
        );
        Ok(DeciderOutput {
            text: parsed.text,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_turn() {
        let turn = parse_decider_output("Let me think about the best season.").unwrap();
        assert_eq!(turn.text, "Let me think about the best season.");
        assert!(turn.requested.is_empty());
    }

    #[test]
    fn test_fenced_tool_calls() {
        let out = "Researching now.\n```json\n{\"tool_calls\": [\
                   {\"id\": \"1\", \"tool\": \"call_researcher\", \"args\": {\"question\": \"flights\"}},\
                   {\"tool\": \"call_researcher\", \"args\": {\"question\": \"hotels\"}}]}\n```";
        let turn = parse_decider_output(out).unwrap();
        assert_eq!(turn.text, "Researching now.");
        assert_eq!(turn.requested.len(), 2);
        assert_eq!(turn.requested[0].id.as_deref(), Some("1"));
        assert_eq!(turn.requested[1].question, "hotels");
        assert!(turn.requested[1].id.is_none());
    }

    #[test]
    fn test_bare_single_call_and_array() {
        let single = parse_decider_output(r#"{"tool": "call_planner", "args": {}}"#).unwrap();
        assert_eq!(single.requested[0].kind, WorkKind::Handoff);
        assert_eq!(single.text, "");

        let array = parse_decider_output(
            r#"Two things: [{"name": "call_researcher", "input": {"question": "visa"}}]"#,
        )
        .unwrap();
        assert_eq!(array.text, "Two things:");
        assert_eq!(array.requested[0].question, "visa");
    }

    #[test]
    fn test_bare_brackets_in_prose_are_text() {
        let turn = parse_decider_output("Budget is tight [see note 1] so {flexible} dates help.").unwrap();
        assert!(turn.requested.is_empty());
        let cites = parse_decider_output("Prices per source [1]").unwrap();
        assert!(cites.requested.is_empty());
    }

    #[test]
    fn test_bare_call_after_bracketed_prose() {
        let turn = parse_decider_output(
            r#"Checking flights [MUC-NRT] now. {"tool": "call_researcher", "args": {"question": "flights"}} Then hotels."#,
        )
        .unwrap();
        assert_eq!(turn.requested.len(), 1);
        assert_eq!(turn.requested[0].question, "flights");
        assert_eq!(turn.text, "Checking flights [MUC-NRT] now.\nThen hotels.");

        let skip_data = parse_decider_output(
            r#"Fares {"MUC": 640} look fine. {"tool": "call_planner", "args": {}}"#,
        )
        .unwrap();
        assert_eq!(skip_data.requested[0].kind, WorkKind::Handoff);
        assert_eq!(skip_data.text, r#"Fares {"MUC": 640} look fine."#);
    }

    #[test]
    fn test_unknown_tool_is_malformed() {
        let err = parse_decider_output("```json\n{\"tool\": \"book_flight\", \"args\": {}}\n```").unwrap_err();
        assert!(matches!(err, PlannerError::MalformedOutput(m) if m.contains("book_flight")));
    }

    #[test]
    fn test_broken_fenced_json_is_malformed() {
        assert!(matches!(
            parse_decider_output("```json\n{\"tool\": \n```"),
            Err(PlannerError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_blank_question_is_malformed() {
        assert!(matches!(
            parse_decider_output(r#"{"tool": "call_researcher", "args": {"question": "  "}}"#),
            Err(PlannerError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_parse_tool_call_for_research_steps() {
        let call = parse_tool_call(r#"{"tool": "web_search", "args": {"query": "Tokyo hotels"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(call.tool, "web_search");
        assert_eq!(call.args["query"], "Tokyo hotels");
        assert_eq!(parse_tool_call("Final answer: stay in Shinjuku.").unwrap(), None);
        assert!(parse_tool_call("```json\n{oops}\n```").is_err());
    }
}

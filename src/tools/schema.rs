//! 工作项请求格式的 JSON Schema（schemars 生成）
//!
//! 注入 decider 的 system prompt，约束其输出的 JSON 块结构。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};

/// decider 输出中的 JSON 块：`{"tool_calls": [...]}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct DeciderCallFormat {
    /// 本轮请求的工作项，按声明顺序执行
    pub tool_calls: Vec<CallFormat>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct CallFormat {
    /// 可选的工作项 id；重复或缺省时由系统分配
    pub id: Option<String>,
    pub tool: CallTool,
    /// call_researcher 需要 {"question": "..."}；call_planner 无参数
    pub args: HashMap<String, String>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
enum CallTool {
    /// 委派一个调研问题
    #[schemars(rename = "call_researcher")]
    CallResearcher,
    /// 调研完成，交给 composer 写最终方案
    #[schemars(rename = "call_planner")]
    CallPlanner,
}

/// 返回 decider 调用格式的 JSON Schema 字符串
pub fn decider_call_schema_json() -> String {
    let schema = schema_for!(DeciderCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

//! 角色指令加载：优先读取 config/prompts/<name>.txt，缺失时使用内置文本

use std::path::{Path, PathBuf};

use tracing::debug;

pub const DECIDER_PROMPT: &str = "\
You are the coordinator of a travel planning team. Work out what live information the trip needs \
(flights, lodging, activities and seasonal events on the travel dates, visas and local transport) \
and delegate each open question to the researcher. Do not ask the user for missing details: \
where a requirement is unspecified, use your best judgment. When the research results cover the \
trip, hand off to the planner to write the final itinerary.";

pub const RESEARCHER_PROMPT: &str = "\
You are a travel research specialist. Answer the question you are given with accurate, current \
information from web searches. Prefer concrete options with prices, ratings and source names or \
URLs so that booking links can be included later. Reply in Markdown when you have the answer.";

pub const COMPOSER_PROMPT: &str = "\
You are a travel planner. Using the research gathered in the conversation, write a complete \
day-by-day itinerary in Markdown: transport, accommodation, activities, estimated costs against \
the budget and practical tips. Include booking links where the research provides them.";

/// 查找 prompt 文件的目录，按顺序尝试
fn prompt_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("config/prompts"), PathBuf::from("../config/prompts")]
}

/// 读取 <dir>/<name>.txt；不存在或为空时返回 fallback
pub fn load_prompt_from(dirs: &[PathBuf], name: &str, fallback: &str) -> String {
    for dir in dirs {
        let path = dir.join(format!("{name}.txt"));
        if let Some(text) = read_non_empty(&path) {
            debug!(path = %path.display(), "loaded prompt");
            return text;
        }
    }
    fallback.to_string()
}

pub fn load_prompt(name: &str, fallback: &str) -> String {
    load_prompt_from(&prompt_dirs(), name, fallback)
}

fn read_non_empty(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

//! 规划错误分类
//!
//! CapabilityUnavailable / MalformedOutput 为致命错误，终止会话并上报；
//! 单个调研条目的失败（DelegatedItemFailure）由 Tool Dispatch 就地吸收，不会以错误形式逃逸；
//! 时间线聚合的不一致（AggregationInconsistency）只记日志。

use thiserror::Error;

use crate::llm::LlmError;

/// 会话运行过程中可能出现的致命错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlannerError {
    /// 网络 / 鉴权 / 限流等导致 decider、composer 或委派能力不可用
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// decider 输出无法解析，或请求了未知的工作项类型
    #[error("Malformed output: {0}")]
    MalformedOutput(String),

    /// 入口参数校验失败（缺少出发地/目的地、日期颠倒等）
    #[error("Invalid trip: {0}")]
    InvalidTrip(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Session cancelled")]
    Cancelled,
}

impl PlannerError {
    /// 供 SessionAborted 事件与 UI 使用的简短原因
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl From<LlmError> for PlannerError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::InvalidResponse(msg) => PlannerError::MalformedOutput(msg),
            other => PlannerError::CapabilityUnavailable(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for PlannerError {
    fn from(err: config::ConfigError) -> Self {
        PlannerError::Config(err.to_string())
    }
}

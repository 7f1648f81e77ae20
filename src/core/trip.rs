//! 行程参数：入口输入（全部可选）与会话创建时一次性补全的默认值
//!
//! 缺失的参数不会阻塞等待用户补充：日期按固定规则补全，预算与偏好缺失时由 decider 自行判断。

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::PlannerError;

/// 未指定开始日期时，距今天的天数
const DEFAULT_LEAD_DAYS: i64 = 30;
/// 未指定结束日期时的行程天数
const DEFAULT_TRIP_DAYS: i64 = 7;

/// 入口行程参数（对应 config [trip] 段，也可由调用方直接构造）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TripParams {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// 预算（USD）
    pub budget: Option<f64>,
    pub preferences: Option<String>,
}

/// 补全后的行程参数，只在会话创建时生成一次
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResolvedTrip {
    pub origin: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// None 表示由 decider 选择合理预算
    pub budget: Option<f64>,
    pub preferences: Option<String>,
}

fn shift_days(date: NaiveDate, days: i64) -> Result<NaiveDate, PlannerError> {
    date.checked_add_signed(Duration::days(days))
        .ok_or_else(|| PlannerError::InvalidTrip(format!("date {date} shifted by {days} days is out of range")))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl TripParams {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            destination: Some(destination.into()),
            ..Self::default()
        }
    }

    pub fn with_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_preferences(mut self, preferences: impl Into<String>) -> Self {
        self.preferences = Some(preferences.into());
        self
    }

    /// 校验并补全：出发地与目的地必填；开始日期必须早于结束日期
    pub fn resolve(&self, today: NaiveDate) -> Result<ResolvedTrip, PlannerError> {
        let origin = non_blank(&self.origin)
            .ok_or_else(|| PlannerError::InvalidTrip("origin is required".to_string()))?;
        let destination = non_blank(&self.destination)
            .ok_or_else(|| PlannerError::InvalidTrip("destination is required".to_string()))?;

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(PlannerError::InvalidTrip(format!(
                    "end date {end} must be after start date {start}"
                )));
            }
        }

        let lead_start = shift_days(today, DEFAULT_LEAD_DAYS)?;
        let (start_date, end_date) = match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => (start, end),
            (Some(start), None) => (start, shift_days(start, DEFAULT_TRIP_DAYS)?),
            // 只给了结束日期：往前推默认天数，且不晚于默认出发日
            (None, Some(end)) => (shift_days(end, -DEFAULT_TRIP_DAYS)?.min(lead_start), end),
            (None, None) => (lead_start, shift_days(lead_start, DEFAULT_TRIP_DAYS)?),
        };

        let budget = match self.budget {
            Some(b) if !b.is_finite() || b <= 0.0 => {
                return Err(PlannerError::InvalidTrip(format!("budget must be positive, got {b}")));
            }
            other => other,
        };

        Ok(ResolvedTrip {
            origin,
            destination,
            start_date,
            end_date,
            budget,
            preferences: non_blank(&self.preferences),
        })
    }
}

impl ResolvedTrip {
    pub fn nights(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }

    /// 产物建议文件名：trip_<目的地>.md，目的地小写，字母数字、- 和 _ 以外的字符替换为下划线
    pub fn suggested_filename(&self) -> String {
        let stem: String = self
            .destination
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("trip_{stem}.md")
    }

    /// 渲染进 decider 指令的「用户需求」段
    pub fn requirements_section(&self) -> String {
        let budget = match self.budget {
            Some(b) => format!("{b:.0} USD"),
            None => "Not specified (pick the ideal value yourself)".to_string(),
        };
        let notes = self.preferences.as_deref().unwrap_or("None");
        format!(
            "### User Requirements:\n- From: {}\n- To: {}\n- Dates: {} to {} ({} days)\n- Budget: {}\n- Notes: {}\n",
            self.origin,
            self.destination,
            self.start_date,
            self.end_date,
            self.nights(),
            budget,
            notes
        )
    }
}

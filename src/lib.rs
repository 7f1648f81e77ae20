//! Wayfarer - Rust 旅行规划智能体
//!
//! 模块划分：
//! - **agent**: 规划入口（一次性 / 流式）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、执行上下文、会话与行程模型、状态机阶段、会话监管、调研并发池、组件构建
//! - **llm**: LLM 客户端抽象与实现（Anthropic / OpenAI 兼容 / Mock）
//! - **observability**: tracing 初始化
//! - **react**: Decider、调研子智能体、Composer、编排主循环、执行事件
//! - **timeline**: 事件流聚合为时间线，终端渲染
//! - **tools**: web_search 工具、执行器、委派能力与 Tool Dispatch

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod timeline;
pub mod tools;

pub use agent::{drive_timeline, plan_trip, plan_trip_stream, PlanOutcome, PlanStream};
pub use core::{PlannerBuilder, PlannerError, TripParams};

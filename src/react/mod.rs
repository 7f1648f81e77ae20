//! 认知层：Decider、调研子智能体、Composer、编排主循环与执行事件

pub mod composer;
pub mod events;
pub mod loop_;
pub mod planner;
pub mod prompts;
pub mod researcher;

pub use composer::Composer;
pub use events::{EventPayload, EventSink, ExecutionEvent, Node, StepOutput};
pub use loop_::Orchestrator;
pub use planner::{parse_decider_output, parse_tool_call, Decider, DeciderOutput, ParsedTurn, ToolCall};
pub use researcher::ResearchAgent;

//! 工具层：web_search 工具与注册/执行，委派能力 trait，工作项的并发派发

pub mod delegate;
pub mod dispatch;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod search;

pub use delegate::DelegatedCapability;
pub use dispatch::{ToolDispatch, WorkResult, HANDOFF_DEFERRED, HANDOFF_ROUTED};
pub use executor::{ToolError, ToolExecutor};
pub use registry::{Tool, ToolRegistry};
pub use schema::decider_call_schema_json;
pub use search::WebSearchTool;

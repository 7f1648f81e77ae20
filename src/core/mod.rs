//! 核心层：错误分类、执行上下文、会话与行程模型、状态机阶段、会话监管、调研并发池、组件构建

pub mod builder;
pub mod context;
pub mod error;
pub mod session;
pub mod session_supervisor;
pub mod state;
pub mod task_scheduler;
pub mod trip;

pub use builder::{create_llm_from_config, PlannerBuilder, PlannerComponents};
pub use context::ExecutionContext;
pub use error::PlannerError;
pub use session::{check_item_pairing, Message, Session, WorkItem, WorkKind};
pub use session_supervisor::SessionSupervisor;
pub use state::{next_phase, Phase};
pub use task_scheduler::TaskScheduler;
pub use trip::{ResolvedTrip, TripParams};

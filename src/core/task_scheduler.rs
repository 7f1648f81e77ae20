//! 调研并发池
//!
//! Dispatching 阶段每个调研项独立调用委派能力；Semaphore 限制同时在途的调用数，
//! 许可数为 1 时退化为严格串行。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::core::PlannerError;

#[derive(Debug, Clone)]
pub struct TaskScheduler {
    research_semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl TaskScheduler {
    pub fn new(max_concurrent_research: usize) -> Self {
        let max_concurrent = max_concurrent_research.max(1);
        Self {
            research_semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 获取一次委派调用的许可
    pub async fn acquire_research(&self) -> Result<OwnedSemaphorePermit, PlannerError> {
        self.research_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PlannerError::CapabilityUnavailable("research pool closed".to_string()))
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(3)
    }
}

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod frequency;
pub mod handlers;
pub mod scheduler;
pub mod seed;
pub mod types;

#[cfg(test)]
mod tests;

pub use types::{Frequency, Outcome, Task, TaskStatus, TaskType};

pub use error::EngineError;
pub use executor::{Execution, TaskExecutor};
pub use scheduler::{BatchResult, TaskScheduler, TaskStatistics};

pub use dispatch::{DispatchWorker, TaskMessage};
pub use handlers::{HandlerRegistry, TaskHandler};

use std::sync::Arc;

use crate::storage::task::TaskStorage;

/// Wires the executor and scheduler over one storage and one handler
/// registry, so every trigger path resolves handlers identically.
pub fn build_scheduler(
    storage: Arc<dyn TaskStorage>,
    registry: Arc<HandlerRegistry>,
) -> (Arc<TaskExecutor>, TaskScheduler) {
    let executor = Arc::new(TaskExecutor::new(storage, registry));
    let scheduler = TaskScheduler::new(executor.clone());
    (executor, scheduler)
}

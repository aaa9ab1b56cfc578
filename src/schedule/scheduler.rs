use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::schedule::error::EngineError;
use crate::schedule::executor::{Execution, TaskExecutor};
use crate::schedule::types::TaskStatus;

/// Aggregate of one scheduler pass. Individual task failures are data here,
/// not errors: the pass itself completed.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BatchResult {
    /// Tasks that ran and succeeded.
    pub executed: usize,
    /// Tasks that ran and failed (business or configuration).
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Task counts by status, for operational visibility.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub inactive: usize,
    pub active: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskStatistics {
    pub fn total(&self) -> usize {
        self.inactive + self.active + self.running + self.completed + self.failed
    }
}

/// Selects due tasks and drives the executor for each, sequentially, within
/// one process invocation.
pub struct TaskScheduler {
    executor: Arc<TaskExecutor>,
}

impl TaskScheduler {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        Self { executor }
    }

    /// Runs every due task once. A task's business failure never aborts the
    /// batch; a store-unavailable fault does, propagating to the caller so
    /// the process can exit and leave the retry to the next scheduled
    /// invocation.
    pub async fn run_due_tasks(&self) -> Result<BatchResult, EngineError> {
        let run_id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let due = self.executor.storage().list_due(now).await?;
        info!("Scheduler pass {}: {} due task(s)", run_id, due.len());

        let mut batch = BatchResult::default();
        for record in due {
            match self.executor.execute_task(record.id).await {
                Ok(Execution::Succeeded { .. }) => batch.executed += 1,
                Ok(Execution::Failed { error }) => {
                    batch.failed += 1;
                    batch
                        .errors
                        .push(format!("task {} ({}): {}", record.id, record.task_type, error));
                }
                Ok(Execution::Skipped) => {
                    // claimed by a concurrent process between selection and
                    // execution; nothing to record
                }
                Err(e) => {
                    error!("Scheduler pass {} aborted on task {}: {}", run_id, record.id, e);
                    return Err(e);
                }
            }
        }

        info!(
            "Scheduler pass {} done: {} executed, {} failed",
            run_id, batch.executed, batch.failed
        );
        Ok(batch)
    }

    pub async fn task_statistics(&self) -> Result<TaskStatistics, EngineError> {
        let counts = self.executor.storage().count_by_status().await?;
        let mut stats = TaskStatistics::default();

        for (status, count) in counts {
            let count = count as usize;
            match TaskStatus::try_from(status.clone()) {
                Ok(TaskStatus::Inactive) => stats.inactive += count,
                Ok(TaskStatus::Active) => stats.active += count,
                Ok(TaskStatus::Running) => stats.running += count,
                Ok(TaskStatus::Completed) => stats.completed += count,
                Ok(TaskStatus::Failed) => stats.failed += count,
                Err(_) => error!("Ignoring unknown status '{}' in statistics", status),
            }
        }

        Ok(stats)
    }
}

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::schedule::error::EngineError;
use crate::schedule::frequency;
use crate::schedule::handlers::HandlerRegistry;
use crate::schedule::types::{Frequency, Outcome, Task, TaskStatus};
use crate::storage::task::entity::TaskRecord;
use crate::storage::task::{StorageError, TaskStorage};

/// How a single execution attempt ended, as seen by the caller. Business and
/// configuration failures are `Failed` (recorded on the task row); engine
/// faults such as a lost store come back as `Err(EngineError)` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// Not eligible, or another process won the claim.
    Skipped,
    Succeeded { message: Option<String> },
    Failed { error: String },
}

/// Runs one task through its handler and owns every mutation of the task
/// row: status transitions, counters, timestamps, parameter metrics.
pub struct TaskExecutor {
    storage: Arc<dyn TaskStorage>,
    registry: Arc<HandlerRegistry>,
}

impl TaskExecutor {
    pub fn new(storage: Arc<dyn TaskStorage>, registry: Arc<HandlerRegistry>) -> Self {
        Self { storage, registry }
    }

    pub fn storage(&self) -> &Arc<dyn TaskStorage> {
        &self.storage
    }

    /// Scheduled path: runs the task only if it is active and due.
    pub async fn execute_task(&self, task_id: i64) -> Result<Execution, EngineError> {
        self.run(task_id, false, None).await
    }

    /// Manual/CLI path: bypasses the eligibility check but goes through the
    /// identical claim and bookkeeping state machine.
    pub async fn force_execute_task(&self, task_id: i64) -> Result<Execution, EngineError> {
        self.run(task_id, true, None).await
    }

    /// Queue-worker path: force execution with parameters from a dispatch
    /// message overriding the persisted ones for this run.
    pub async fn force_execute_with(
        &self,
        task_id: i64,
        overrides: Map<String, Value>,
    ) -> Result<Execution, EngineError> {
        self.run(task_id, true, Some(overrides)).await
    }

    async fn run(
        &self,
        task_id: i64,
        force: bool,
        overrides: Option<Map<String, Value>>,
    ) -> Result<Execution, EngineError> {
        let record = self
            .storage
            .get(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))?;
        let mut task = match Task::try_from(record.clone()) {
            Ok(task) => task,
            // Ad-hoc tooling can write a type, frequency or parameter blob
            // the engine cannot read. That is a defect of the one row, not
            // of the pass: claim it, record the failure, park it.
            Err(StorageError::CorruptRow { id, reason }) => {
                if !self.storage.claim(task_id).await? {
                    return Ok(Execution::Skipped);
                }
                return self.park_corrupt_row(record, id, reason).await;
            }
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        if !force && !task.is_due(now) {
            return Ok(Execution::Skipped);
        }

        // Compare-and-swap against the store; exactly one of any concurrent
        // callers (overlapping cron passes, a cron pass racing a manual
        // trigger) observes true. Losing the race is a clean no-op.
        if !self.storage.claim(task_id).await? {
            info!("Task {} ({}) already running, skipping", task.id, task.task_type);
            return Ok(Execution::Skipped);
        }
        task.status = TaskStatus::Running;

        if let Some(overrides) = overrides {
            for (key, value) in overrides {
                task.parameters.insert(key, value);
            }
        }

        let handler = match self.registry.resolve(task.task_type) {
            Some(handler) => handler,
            None => {
                // configuration error: local to this task, counted as a failure
                let message = format!("no handler registered for task type {}", task.task_type);
                warn!("Task {}: {}", task.id, message);
                return self.finish_failure(task, message).await;
            }
        };

        self.storage.ping().await?;

        info!("Executing task {} ({})", task.id, task.task_type);
        let outcome = handler.execute(&task.parameters).await;

        // The store may have died while the handler held the process. Probe
        // it once before touching the row again; if it is gone, surface the
        // distinct error and write nothing more through the broken context.
        if let Err(e) = self.storage.ping().await {
            error!(
                "Task store became unavailable during task {} ({}): {}",
                task.id, task.task_type, e
            );
            return Err(e.into());
        }

        match outcome {
            Ok(outcome) if outcome.success => self.finish_success(task, outcome).await,
            Ok(outcome) => {
                let message = outcome
                    .message
                    .unwrap_or_else(|| "handler reported failure".to_string());
                self.finish_failure(task, message).await
            }
            Err(e) => self.finish_failure(task, format!("{:#}", e)).await,
        }
    }

    /// Writes a failure straight onto the raw row when the row itself cannot
    /// be turned into a task. `FAILED` keeps it out of later passes until an
    /// operator repairs it.
    async fn park_corrupt_row(
        &self,
        mut record: TaskRecord,
        id: i64,
        reason: String,
    ) -> Result<Execution, EngineError> {
        let now = Utc::now();
        let message = format!("unreadable task row: {}", reason);

        record.status = TaskStatus::Failed.as_str().to_string();
        record.run_count += 1;
        record.failure_count += 1;
        record.last_run_at = Some(now);
        record.next_run_at = None;
        record.last_error = Some(message.clone());
        record.result = None;
        record.updated_at = now;

        self.storage.update(&record).await?;
        warn!("Task {} row is unreadable, parked: {}", id, reason);

        Ok(Execution::Failed { error: message })
    }

    async fn finish_success(
        &self,
        mut task: Task,
        outcome: Outcome,
    ) -> Result<Execution, EngineError> {
        let now = Utc::now();

        for (key, value) in outcome.metrics {
            task.parameters.insert(key, value);
        }
        task.last_error = None;
        task.run_count += 1;
        task.success_count += 1;
        task.last_run_at = Some(now);
        task.next_run_at = frequency::next_run(&task.frequency, now);
        task.result = outcome.message.clone();
        task.status = match task.frequency {
            Frequency::Once => TaskStatus::Completed,
            // A cron rule can parse yet never fire again. With no next
            // instant an active recurring task would be selected forever,
            // so park it for an operator instead.
            _ if task.frequency.is_recurring() && task.next_run_at.is_none() => {
                task.last_error = Some("schedule yields no future run".to_string());
                TaskStatus::Failed
            }
            _ => TaskStatus::Active,
        };
        task.updated_at = now;

        self.storage.update(&TaskRecord::from(&task)).await?;
        info!(
            "Task {} ({}) succeeded, next run {:?}",
            task.id, task.task_type, task.next_run_at
        );

        Ok(Execution::Succeeded { message: outcome.message })
    }

    async fn finish_failure(&self, mut task: Task, message: String) -> Result<Execution, EngineError> {
        let now = Utc::now();

        task.last_error = Some(message.clone());
        task.run_count += 1;
        task.failure_count += 1;
        task.last_run_at = Some(now);
        // a failing recurring task keeps retrying on its natural schedule
        task.next_run_at = frequency::next_run(&task.frequency, now);
        task.result = None;
        task.status = match task.frequency {
            Frequency::Once => TaskStatus::Failed,
            // recurring with no future instant left: parked, see finish_success
            _ if task.frequency.is_recurring() && task.next_run_at.is_none() => TaskStatus::Failed,
            _ => TaskStatus::Active,
        };
        task.updated_at = now;

        self.storage.update(&TaskRecord::from(&task)).await?;
        warn!("Task {} ({}) failed: {}", task.id, task.task_type, message);

        Ok(Execution::Failed { error: message })
    }
}

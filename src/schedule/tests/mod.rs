use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};

use crate::schedule::dispatch::{DispatchWorker, TaskMessage};
use crate::schedule::executor::{Execution, TaskExecutor};
use crate::schedule::handlers::generate_rents::{
    GenerateRentsHandler, InMemoryRentLedger, Lease,
};
use crate::schedule::handlers::{HandlerRegistry, TaskHandler};
use crate::schedule::scheduler::TaskScheduler;
use crate::schedule::types::{Outcome, Task, TaskType};
use crate::storage::task::entity::TaskRecord;
use crate::storage::task::sqlite::SqliteTaskStorage;
use crate::storage::task::TaskStorage;

struct OkHandler(TaskType);

#[async_trait]
impl TaskHandler for OkHandler {
    fn task_type(&self) -> TaskType {
        self.0
    }

    async fn execute(&self, _parameters: &Map<String, Value>) -> Result<Outcome> {
        Ok(Outcome::succeeded("done").with_metric("last_items", 3))
    }
}

struct FailHandler(TaskType);

#[async_trait]
impl TaskHandler for FailHandler {
    fn task_type(&self) -> TaskType {
        self.0
    }

    async fn execute(&self, _parameters: &Map<String, Value>) -> Result<Outcome> {
        Ok(Outcome::failed("upstream accounting service unavailable"))
    }
}

/// Simulates the persistence context dying while the handler runs.
struct StoreClosingHandler {
    task_type: TaskType,
    storage: Arc<SqliteTaskStorage>,
}

#[async_trait]
impl TaskHandler for StoreClosingHandler {
    fn task_type(&self) -> TaskType {
        self.task_type
    }

    async fn execute(&self, _parameters: &Map<String, Value>) -> Result<Outcome> {
        self.storage.close().await;
        Ok(Outcome::succeeded("ran, but the store is gone"))
    }
}

// A pooled in-memory database would hand every pooled connection its own
// empty database, so tests run against a throwaway on-disk file instead.
fn temp_db() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("tasks.db").display());
    (dir, url)
}

async fn setup(
    handlers: Vec<Box<dyn TaskHandler>>,
) -> (tempfile::TempDir, Arc<dyn TaskStorage>, Arc<TaskExecutor>, TaskScheduler) {
    let (dir, url) = temp_db();
    let storage: Arc<dyn TaskStorage> = Arc::new(SqliteTaskStorage::new(&url).await.unwrap());

    let mut registry = HandlerRegistry::new();
    for handler in handlers {
        registry.register(handler);
    }

    let executor = Arc::new(TaskExecutor::new(storage.clone(), Arc::new(registry)));
    let scheduler = TaskScheduler::new(executor.clone());
    (dir, storage, executor, scheduler)
}

fn record(
    task_type: TaskType,
    frequency: &str,
    status: &str,
    next_run_at: Option<DateTime<Utc>>,
) -> TaskRecord {
    let now = Utc::now();
    TaskRecord {
        id: 0,
        task_type: task_type.as_str().to_string(),
        name: task_type.as_str().to_string(),
        description: String::new(),
        frequency: frequency.to_string(),
        status: status.to_string(),
        parameters: "{}".to_string(),
        last_run_at: None,
        next_run_at,
        run_count: 0,
        success_count: 0,
        failure_count: 0,
        last_error: None,
        result: None,
        created_at: now,
        updated_at: now,
    }
}

async fn load(storage: &Arc<dyn TaskStorage>, id: i64) -> Task {
    Task::try_from(storage.get(id).await.unwrap().unwrap()).unwrap()
}

#[tokio::test]
async fn due_daily_task_runs_and_reschedules_tomorrow() {
    let (_dir, storage, _executor, scheduler) =
        setup(vec![Box::new(OkHandler(TaskType::GenerateRents))]).await;

    let past_due = Some(Utc::now() - Duration::hours(1));
    let id = storage
        .insert(&record(TaskType::GenerateRents, "DAILY", "ACTIVE", past_due))
        .await
        .unwrap();

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed, 1);
    assert_eq!(batch.failed, 0);

    let task = load(&storage, id).await;
    assert_eq!(task.run_count, 1);
    assert_eq!(task.success_count, 1);
    assert_eq!(task.failure_count, 0);
    assert_eq!(task.status.as_str(), "ACTIVE");
    assert!(task.last_error.is_none());
    assert_eq!(task.parameters["last_items"], 3);
    assert_eq!(
        task.next_run_at.unwrap(),
        task.last_run_at.unwrap() + Duration::days(1)
    );
}

#[tokio::test]
async fn failing_recurring_task_stays_on_schedule() {
    let (_dir, storage, _executor, scheduler) =
        setup(vec![Box::new(FailHandler(TaskType::SyncAccounting))]).await;

    let id = storage
        .insert(&record(TaskType::SyncAccounting, "DAILY", "ACTIVE", None))
        .await
        .unwrap();

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed, 0);
    assert_eq!(batch.failed, 1);
    assert_eq!(batch.errors.len(), 1);
    assert!(batch.errors[0].contains("upstream accounting service unavailable"));

    let task = load(&storage, id).await;
    assert_eq!(task.run_count, 1);
    assert_eq!(task.failure_count, 1);
    assert_eq!(task.status.as_str(), "ACTIVE");
    assert!(task.next_run_at.is_some(), "keeps retrying on schedule");
    assert!(task.last_error.unwrap().contains("accounting"));
}

#[tokio::test]
async fn unregistered_type_is_a_task_local_configuration_failure() {
    let (_dir, storage, _executor, scheduler) = setup(vec![]).await;

    let id = storage
        .insert(&record(TaskType::Backup, "DAILY", "ACTIVE", None))
        .await
        .unwrap();

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.failed, 1);

    let task = load(&storage, id).await;
    assert_eq!(task.failure_count, 1);
    assert!(task.last_error.unwrap().contains("no handler registered"));
}

#[tokio::test]
async fn once_task_completes_and_leaves_the_schedule() {
    let (_dir, storage, _executor, scheduler) =
        setup(vec![Box::new(OkHandler(TaskType::DemoCreate))]).await;

    let id = storage
        .insert(&record(TaskType::DemoCreate, "ONCE", "ACTIVE", None))
        .await
        .unwrap();

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed, 1);

    let task = load(&storage, id).await;
    assert_eq!(task.status.as_str(), "COMPLETED");
    assert!(task.next_run_at.is_none());

    // completed one-shots are excluded from every later pass
    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed, 0);
    assert_eq!(batch.failed, 0);
}

#[tokio::test]
async fn once_task_failure_is_terminal() {
    let (_dir, storage, _executor, scheduler) =
        setup(vec![Box::new(FailHandler(TaskType::DemoDelete))]).await;

    let id = storage
        .insert(&record(TaskType::DemoDelete, "ONCE", "ACTIVE", None))
        .await
        .unwrap();

    scheduler.run_due_tasks().await.unwrap();

    let task = load(&storage, id).await;
    assert_eq!(task.status.as_str(), "FAILED");
    assert!(task.next_run_at.is_none());

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed + batch.failed, 0);
}

#[tokio::test]
async fn manual_task_runs_only_when_forced() {
    let (_dir, storage, executor, scheduler) =
        setup(vec![Box::new(OkHandler(TaskType::Backup))]).await;

    let id = storage
        .insert(&record(TaskType::Backup, "MANUAL", "ACTIVE", None))
        .await
        .unwrap();

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed + batch.failed, 0, "manual tasks are never selected");

    let execution = executor.force_execute_task(id).await.unwrap();
    assert!(matches!(execution, Execution::Succeeded { .. }));

    let task = load(&storage, id).await;
    assert_eq!(task.status.as_str(), "ACTIVE");
    assert!(task.next_run_at.is_none());
    assert_eq!(task.success_count, 1);
}

#[tokio::test]
async fn running_task_cannot_be_claimed_again() {
    let (_dir, storage, executor, _scheduler) =
        setup(vec![Box::new(OkHandler(TaskType::Backup))]).await;

    let id = storage
        .insert(&record(TaskType::Backup, "DAILY", "RUNNING", None))
        .await
        .unwrap();

    let execution = executor.force_execute_task(id).await.unwrap();
    assert_eq!(execution, Execution::Skipped);

    let task = load(&storage, id).await;
    assert_eq!(task.run_count, 0, "a lost claim has no side effects");
    assert_eq!(task.status.as_str(), "RUNNING");
}

#[tokio::test]
async fn inactive_and_terminal_tasks_are_never_selected() {
    let (_dir, storage, _executor, scheduler) =
        setup(vec![Box::new(OkHandler(TaskType::Backup))]).await;

    for status in ["INACTIVE", "RUNNING", "COMPLETED", "FAILED"] {
        storage
            .insert(&record(TaskType::Backup, "DAILY", status, None))
            .await
            .unwrap();
    }

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed + batch.failed, 0);
}

#[tokio::test]
async fn unreadable_row_is_parked_and_the_batch_continues() {
    let (_dir, storage, _executor, scheduler) =
        setup(vec![Box::new(OkHandler(TaskType::GenerateRents))]).await;

    // a lower id than the healthy task, so it is selected first
    let mut bad_type = record(TaskType::Backup, "DAILY", "ACTIVE", None);
    bad_type.task_type = "NOT_A_REAL_TYPE".to_string();
    let bad_type_id = storage.insert(&bad_type).await.unwrap();

    let mut bad_parameters = record(TaskType::SyncAccounting, "DAILY", "ACTIVE", None);
    bad_parameters.parameters = "not json".to_string();
    let bad_parameters_id = storage.insert(&bad_parameters).await.unwrap();

    let ok_id = storage
        .insert(&record(TaskType::GenerateRents, "DAILY", "ACTIVE", None))
        .await
        .unwrap();

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed, 1);
    assert_eq!(batch.failed, 2);

    for id in [bad_type_id, bad_parameters_id] {
        let row = storage.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, "FAILED");
        assert_eq!(row.run_count, 1);
        assert_eq!(row.failure_count, 1);
        assert!(row.last_error.unwrap().contains("unreadable task row"));
    }

    let task = load(&storage, ok_id).await;
    assert_eq!(task.success_count, 1, "healthy tasks still run");

    // parked rows are excluded from later passes
    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.failed, 0);
}

#[tokio::test]
async fn cron_task_reschedules_strictly_into_the_future() {
    let (_dir, storage, _executor, scheduler) =
        setup(vec![Box::new(OkHandler(TaskType::NotifyOwners))]).await;

    let id = storage
        .insert(&record(TaskType::NotifyOwners, "0 0 6 * * *", "ACTIVE", None))
        .await
        .unwrap();

    let before = Utc::now();
    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed, 1);

    let task = load(&storage, id).await;
    assert_eq!(task.status.as_str(), "ACTIVE");
    assert_eq!(task.success_count, 1);
    assert!(task.next_run_at.unwrap() > before);
}

#[tokio::test]
async fn recurring_task_with_a_spent_cron_rule_is_parked() {
    let (_dir, storage, _executor, scheduler) =
        setup(vec![Box::new(OkHandler(TaskType::PurgeOldBackups))]).await;

    // February 30th: parses, never fires
    let id = storage
        .insert(&record(TaskType::PurgeOldBackups, "0 0 0 30 2 *", "ACTIVE", None))
        .await
        .unwrap();

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed, 1, "the run itself succeeded");

    let task = load(&storage, id).await;
    assert_eq!(task.status.as_str(), "FAILED");
    assert_eq!(task.success_count, 1);
    assert!(task.next_run_at.is_none());
    assert!(task.last_error.unwrap().contains("no future run"));

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed + batch.failed, 0, "not selected again");
}

#[tokio::test]
async fn counter_invariant_holds_across_a_mixed_batch() {
    let (_dir, storage, _executor, scheduler) = setup(vec![
        Box::new(OkHandler(TaskType::GenerateRents)),
        Box::new(FailHandler(TaskType::SyncAccounting)),
    ])
    .await;

    let ok_id = storage
        .insert(&record(TaskType::GenerateRents, "DAILY", "ACTIVE", None))
        .await
        .unwrap();
    let ko_id = storage
        .insert(&record(TaskType::SyncAccounting, "WEEKLY", "ACTIVE", None))
        .await
        .unwrap();

    let batch = scheduler.run_due_tasks().await.unwrap();
    assert_eq!(batch.executed, 1);
    assert_eq!(batch.failed, 1);

    for id in [ok_id, ko_id] {
        let task = load(&storage, id).await;
        assert_eq!(task.run_count, task.success_count + task.failure_count);
        assert_eq!(task.run_count, 1);
    }
}

#[tokio::test]
async fn store_loss_during_a_handler_is_a_distinct_process_fault() {
    let (_dir, url) = temp_db();

    let sqlite = Arc::new(SqliteTaskStorage::new(&url).await.unwrap());
    let storage: Arc<dyn TaskStorage> = sqlite.clone();

    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(StoreClosingHandler {
        task_type: TaskType::Backup,
        storage: sqlite.clone(),
    }));
    let executor = TaskExecutor::new(storage.clone(), Arc::new(registry));

    let id = storage
        .insert(&record(TaskType::Backup, "DAILY", "ACTIVE", None))
        .await
        .unwrap();

    let err = executor.force_execute_task(id).await.unwrap_err();
    assert!(err.is_store_unavailable(), "got: {}", err);

    // fresh connection, as the next scheduled invocation would get: the
    // claim is the last write that landed, no counter was touched
    let reopened: Arc<dyn TaskStorage> = Arc::new(SqliteTaskStorage::new(&url).await.unwrap());
    let task = Task::try_from(reopened.get(id).await.unwrap().unwrap()).unwrap();
    assert_eq!(task.failure_count, 0);
    assert_eq!(task.run_count, 0);
    assert_eq!(task.status.as_str(), "RUNNING");
}

#[tokio::test]
async fn dispatch_worker_resolves_through_the_same_registry() {
    let ledger = Arc::new(InMemoryRentLedger::new(vec![Lease {
        id: "lease-9".into(),
        rent_amount: 65_000,
    }]));

    let (_dir, url) = temp_db();
    let storage: Arc<dyn TaskStorage> = Arc::new(SqliteTaskStorage::new(&url).await.unwrap());
    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(GenerateRentsHandler::new(ledger.clone())));
    let executor = Arc::new(TaskExecutor::new(storage.clone(), Arc::new(registry)));
    let worker = DispatchWorker::new(executor);

    let id = storage
        .insert(&record(TaskType::GenerateRents, "MANUAL", "ACTIVE", None))
        .await
        .unwrap();

    let mut parameters = Map::new();
    parameters.insert("period".into(), "2024-04".into());
    let message = TaskMessage::new(TaskType::GenerateRents, parameters);
    let decoded = TaskMessage::from_bytes(&message.to_bytes().unwrap()).unwrap();

    let execution = worker.handle(decoded).await.unwrap();
    assert!(matches!(execution, Execution::Succeeded { .. }));
    assert_eq!(ledger.rent_count().await, 1);

    let task = load(&storage, id).await;
    assert_eq!(task.parameters["last_period"], "2024-04");
    assert_eq!(task.success_count, 1);
}

#[tokio::test]
async fn dispatch_run_consumes_until_the_channel_closes() {
    let ledger = Arc::new(InMemoryRentLedger::new(vec![Lease {
        id: "lease-1".into(),
        rent_amount: 90_000,
    }]));

    let (_dir, url) = temp_db();
    let storage: Arc<dyn TaskStorage> = Arc::new(SqliteTaskStorage::new(&url).await.unwrap());
    let mut registry = HandlerRegistry::new();
    registry.register(Box::new(GenerateRentsHandler::new(ledger.clone())));
    let executor = Arc::new(TaskExecutor::new(storage.clone(), Arc::new(registry)));
    let worker = DispatchWorker::new(executor);

    storage
        .insert(&record(TaskType::GenerateRents, "MANUAL", "ACTIVE", None))
        .await
        .unwrap();

    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let mut parameters = Map::new();
    parameters.insert("period".into(), "2024-05".into());
    let message = TaskMessage::new(TaskType::GenerateRents, parameters);
    tx.send(message.to_bytes().unwrap()).await.unwrap();
    // undecodable payloads are logged and skipped, not fatal
    tx.send(b"not a task message".to_vec()).await.unwrap();
    drop(tx);

    worker.run(rx).await.unwrap();
    assert_eq!(ledger.rent_count().await, 1);
}

#[tokio::test]
async fn dispatch_for_an_unseeded_type_is_an_engine_fault() {
    let (_dir, _storage, executor, _scheduler) = setup(vec![]).await;
    let worker = DispatchWorker::new(executor);

    let err = worker
        .handle(TaskMessage::new(TaskType::Backup, Map::new()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no task registered"));
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::task::entity::TaskRecord;
use crate::storage::Pagination;

pub mod entity;
pub mod mapping;
pub mod sqlite;

/// Discriminated storage failure. `Unavailable` is the structured signal the
/// executor matches on to classify a persistence-unavailable condition; it is
/// never inferred from message text.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    #[error("task store query failed: {0}")]
    Query(String),

    #[error("corrupt task row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },
}

#[async_trait]
pub trait TaskStorage: Send + Sync + 'static {
    /// Inserts a new task definition and returns its id.
    async fn insert(&self, record: &TaskRecord) -> Result<i64, StorageError>;

    async fn get(&self, id: i64) -> Result<Option<TaskRecord>, StorageError>;

    async fn get_by_type(&self, task_type: &str) -> Result<Option<TaskRecord>, StorageError>;

    async fn list(&self, pagination: &Pagination) -> Result<Vec<TaskRecord>, StorageError>;

    /// Active tasks that are past due or never scheduled with a recurring
    /// frequency, ordered by id.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<TaskRecord>, StorageError>;

    /// Conditional ACTIVE -> RUNNING transition. Returns `true` for exactly
    /// one caller; a plain read-then-write would permit double execution
    /// when a cron pass overlaps a manual trigger.
    async fn claim(&self, id: i64) -> Result<bool, StorageError>;

    /// Writes back the full run state after an execution.
    async fn update(&self, record: &TaskRecord) -> Result<(), StorageError>;

    /// Administrative activation/deactivation.
    async fn set_status(&self, id: i64, status: &str) -> Result<(), StorageError>;

    async fn delete(&self, id: i64) -> Result<(), StorageError>;

    async fn count_by_status(&self) -> Result<Vec<(String, i64)>, StorageError>;

    /// Capability probe: cheap round-trip that fails with
    /// [`StorageError::Unavailable`] when the write context is unusable.
    async fn ping(&self) -> Result<(), StorageError>;
}

use thiserror::Error;

use crate::storage::task::StorageError;

/// Engine-level faults surfaced to the caller (CLI, queue worker).
///
/// Business and configuration failures of a single task are *not* errors at
/// this level: they are recorded on the task row and aggregated into the
/// batch result. Anything that does become an `EngineError` maps to a
/// non-zero process exit.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("no task registered for type {0}")]
    NoTaskOfType(String),

    #[error(transparent)]
    Store(#[from] StorageError),
}

impl EngineError {
    /// True when the backing store's write context is no longer usable and
    /// the current process should exit rather than retry in-process.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, EngineError::Store(StorageError::Unavailable(_)))
    }
}

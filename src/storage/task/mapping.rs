use serde_json::Map;

use crate::schedule::types::{Frequency, Task, TaskStatus, TaskType};
use crate::storage::task::entity::TaskRecord;
use crate::storage::task::StorageError;

impl TryFrom<TaskRecord> for Task {
    type Error = StorageError;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        fn corrupt(id: i64, reason: String) -> StorageError {
            StorageError::CorruptRow { id, reason }
        }
        let id = record.id;

        let task_type: TaskType = record.task_type.parse().map_err(|e| corrupt(id, e))?;
        let frequency: Frequency = record.frequency.parse().map_err(|e| corrupt(id, e))?;
        let status =
            TaskStatus::try_from(record.status.clone()).map_err(|e| corrupt(id, e))?;
        let parameters: Map<String, serde_json::Value> =
            serde_json::from_str(&record.parameters)
                .map_err(|e| corrupt(id, format!("bad parameters json: {}", e)))?;

        Ok(Task {
            id: record.id,
            task_type,
            name: record.name,
            description: record.description,
            frequency,
            status,
            parameters,
            last_run_at: record.last_run_at,
            next_run_at: record.next_run_at,
            run_count: record.run_count,
            success_count: record.success_count,
            failure_count: record.failure_count,
            last_error: record.last_error,
            result: record.result,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        TaskRecord {
            id: task.id,
            task_type: task.task_type.as_str().to_string(),
            name: task.name.clone(),
            description: task.description.clone(),
            frequency: task.frequency.as_str().to_string(),
            status: task.status.as_str().to_string(),
            parameters: serde_json::Value::Object(task.parameters.clone()).to_string(),
            last_run_at: task.last_run_at,
            next_run_at: task.next_run_at,
            run_count: task.run_count,
            success_count: task.success_count,
            failure_count: task.failure_count,
            last_error: task.last_error.clone(),
            result: task.result.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

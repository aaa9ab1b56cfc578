use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::schedule::error::EngineError;
use crate::schedule::executor::{Execution, TaskExecutor};
use crate::schedule::types::TaskType;

/// Transport envelope for triggering a task out-of-band. Carries exactly the
/// `(type, parameters)` pair the synchronous path would use and nothing
/// else; business logic stays in the handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_type: TaskType,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl TaskMessage {
    pub fn new(task_type: TaskType, parameters: Map<String, Value>) -> Self {
        Self { task_type, parameters }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Worker side of the async trigger path. Maps a message 1:1 back onto the
/// task row for its type and feeds the same executor (and therefore the
/// same handler registry) the scheduler uses.
pub struct DispatchWorker {
    executor: Arc<TaskExecutor>,
}

impl DispatchWorker {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        Self { executor }
    }

    pub async fn handle(&self, message: TaskMessage) -> Result<Execution, EngineError> {
        let record = self
            .executor
            .storage()
            .get_by_type(message.task_type.as_str())
            .await?
            .ok_or_else(|| EngineError::NoTaskOfType(message.task_type.to_string()))?;

        info!(
            "Dispatch message for {} -> task {}",
            message.task_type, record.id
        );
        self.executor
            .force_execute_with(record.id, message.parameters)
            .await
    }

    /// Consumes encoded messages from a queue until the channel closes.
    /// A store-unavailable fault stops consumption so the process exits and
    /// leaves redelivery to the queue.
    pub async fn run(&self, mut rx: mpsc::Receiver<Vec<u8>>) -> Result<(), EngineError> {
        while let Some(bytes) = rx.recv().await {
            let message = match TaskMessage::from_bytes(&bytes) {
                Ok(message) => message,
                Err(e) => {
                    error!("Discarding undecodable dispatch message: {}", e);
                    continue;
                }
            };

            match self.handle(message).await {
                Ok(_) => {}
                Err(e) if e.is_store_unavailable() => return Err(e),
                Err(e) => error!("Dispatch message failed: {}", e),
            }
        }
        Ok(())
    }
}

pub mod generate_rents;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::schedule::types::{Outcome, TaskType};

pub use generate_rents::GenerateRentsHandler;

/// The concrete operation a task type triggers. Implementations live with
/// the business modules (rent computation, document generation, backups, ...)
/// and are opaque to the engine.
///
/// Handlers must be idempotent for the same logical period: being invoked
/// twice for "generate rent for lease L due on date D" must not create a
/// duplicate record. The engine relies on this contract and provides no
/// deduplication of its own.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn task_type(&self) -> TaskType;

    /// Runs the operation with the task's parameters map and reports a
    /// structured outcome. A `Result::Err` is treated exactly like a
    /// reported failure; it exists so handlers can use `?` internally.
    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Outcome>;
}

/// Single source of truth for the type -> handler binding.
///
/// Both trigger paths (the scheduler/CLI and the queue worker) resolve
/// through the same registry instance, so adding a task type is one
/// registration, not two, and the paths cannot diverge.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Box<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn TaskHandler>) {
        let task_type = handler.task_type();
        info!("Registering handler for task type {}", task_type);
        self.handlers.insert(task_type, handler);
    }

    pub fn resolve(&self, task_type: TaskType) -> Option<&dyn TaskHandler> {
        self.handlers.get(&task_type).map(|h| h.as_ref())
    }

    pub fn registered_types(&self) -> Vec<TaskType> {
        self.handlers.keys().copied().collect()
    }
}

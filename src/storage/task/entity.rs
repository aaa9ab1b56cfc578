use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row shape of the `tasks` table. Enum-typed fields of the domain model are
/// stored as their string forms; `parameters` is a JSON object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub task_type: String,
    pub name: String,
    pub description: String,
    pub frequency: String,
    pub status: String,
    pub parameters: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub run_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_error: Option<String>,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

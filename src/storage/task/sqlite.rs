use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::{StorageError, TaskStorage};
use crate::storage::task::entity::TaskRecord;
use crate::storage::Pagination;

pub struct SqliteTaskStorage {
    pool: SqlitePool,
}

/// Fixed-width RFC 3339 so text comparison in SQL orders correctly.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn parse_ts(text: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Query(format!("bad timestamp '{}': {}", text, e)))
}

/// Maps sqlx failures onto the discriminated storage error. Pool-level
/// conditions mean the write context is gone and the process must not keep
/// using it; everything else is an ordinary query failure.
fn classify(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StorageError::Unavailable(e.to_string())
        }
        other => StorageError::Query(other.to_string()),
    }
}

impl SqliteTaskStorage {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        info!("Initializing SQLite task storage at {}", database_url);
        let pool = SqlitePool::connect(database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_type TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                frequency TEXT NOT NULL,
                status TEXT NOT NULL,
                parameters TEXT NOT NULL DEFAULT '{}',
                last_run_at TEXT,
                next_run_at TEXT,
                run_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                result TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Closes the pool. Only used by shutdown paths and tests simulating a
    /// lost persistence context.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_record(&self, row: sqlx::sqlite::SqliteRow) -> Result<TaskRecord, StorageError> {
        let last_run_at: Option<String> = row.get("last_run_at");
        let next_run_at: Option<String> = row.get("next_run_at");

        Ok(TaskRecord {
            id: row.get("id"),
            task_type: row.get("task_type"),
            name: row.get("name"),
            description: row.get("description"),
            frequency: row.get("frequency"),
            status: row.get("status"),
            parameters: row.get("parameters"),
            last_run_at: last_run_at.as_deref().map(parse_ts).transpose()?,
            next_run_at: next_run_at.as_deref().map(parse_ts).transpose()?,
            run_count: row.get("run_count"),
            success_count: row.get("success_count"),
            failure_count: row.get("failure_count"),
            last_error: row.get("last_error"),
            result: row.get("result"),
            created_at: parse_ts(row.get("created_at"))?,
            updated_at: parse_ts(row.get("updated_at"))?,
        })
    }

    fn rows_to_records(
        &self,
        rows: Vec<sqlx::sqlite::SqliteRow>,
    ) -> Result<Vec<TaskRecord>, StorageError> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.row_to_record(row)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl TaskStorage for SqliteTaskStorage {
    async fn insert(&self, record: &TaskRecord) -> Result<i64, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO tasks
            (task_type, name, description, frequency, status, parameters,
             last_run_at, next_run_at, run_count, success_count, failure_count,
             last_error, result, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.task_type)
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.frequency)
        .bind(&record.status)
        .bind(&record.parameters)
        .bind(record.last_run_at.as_ref().map(ts))
        .bind(record.next_run_at.as_ref().map(ts))
        .bind(record.run_count)
        .bind(record.success_count)
        .bind(record.failure_count)
        .bind(&record.last_error)
        .bind(&record.result)
        .bind(ts(&record.created_at))
        .bind(ts(&record.updated_at))
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> Result<Option<TaskRecord>, StorageError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        row.map(|r| self.row_to_record(r)).transpose()
    }

    async fn get_by_type(&self, task_type: &str) -> Result<Option<TaskRecord>, StorageError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE task_type = ? ORDER BY id LIMIT 1")
            .bind(task_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        row.map(|r| self.row_to_record(r)).transpose()
    }

    async fn list(&self, pagination: &Pagination) -> Result<Vec<TaskRecord>, StorageError> {
        let pagination = pagination.check();
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY id LIMIT ? OFFSET ?")
            .bind(pagination.limit() as i64)
            .bind(pagination.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        self.rows_to_records(rows)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<TaskRecord>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tasks
            WHERE status = 'ACTIVE'
              AND (
                    (next_run_at IS NOT NULL AND next_run_at <= ?)
                 OR (next_run_at IS NULL AND frequency NOT IN ('MANUAL', 'ONCE'))
              )
            ORDER BY id ASC
            "#,
        )
        .bind(ts(&now))
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        self.rows_to_records(rows)
    }

    async fn claim(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'RUNNING', updated_at = ? WHERE id = ? AND status = 'ACTIVE'",
        )
        .bind(ts(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(&self, record: &TaskRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET name = ?, description = ?, frequency = ?, status = ?,
                parameters = ?, last_run_at = ?, next_run_at = ?,
                run_count = ?, success_count = ?, failure_count = ?,
                last_error = ?, result = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.name)
        .bind(&record.description)
        .bind(&record.frequency)
        .bind(&record.status)
        .bind(&record.parameters)
        .bind(record.last_run_at.as_ref().map(ts))
        .bind(record.next_run_at.as_ref().map(ts))
        .bind(record.run_count)
        .bind(record.success_count)
        .bind(record.failure_count)
        .bind(&record.last_error)
        .bind(&record.result)
        .bind(ts(&record.updated_at))
        .bind(record.id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn set_status(&self, id: i64, status: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(ts(&Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn count_by_status(&self) -> Result<Vec<(String, i64)>, StorageError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("status"), row.get("n")))
            .collect())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Unavailable("connection pool is closed".into()));
        }
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

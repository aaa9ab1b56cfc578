use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of back-office operations the engine knows how to dispatch.
///
/// Each value corresponds to exactly one registered handler; the string form
/// (`GENERATE_RENTS`, `BACKUP`, ...) is what gets persisted and what the CLI
/// and queue messages carry.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    GenerateRents,
    GenerateReceipts,
    GenerateRentStatements,
    GenerateDocuments,
    GenerateInventoryReports,
    GenerateTaxReport,
    ReviseRents,
    RecomputeBalances,
    ImportPayments,
    ReconcilePayments,
    SyncAccounting,
    ExportAccounting,
    EncryptDocuments,
    ArchiveDocuments,
    SendRentReminders,
    SendRentNotices,
    SendPaymentConfirmations,
    SendLeaseExpiryAlerts,
    SendWelcomeEmails,
    NotifyOwners,
    NotifyTenants,
    RefreshStatistics,
    UpdatePropertyIndexes,
    CleanupExpiredInvites,
    CleanupOrphanFiles,
    PurgeOldBackups,
    Backup,
    DemoCreate,
    DemoRefresh,
    DemoDelete,
}

impl TaskType {
    pub const ALL: [TaskType; 30] = [
        TaskType::GenerateRents,
        TaskType::GenerateReceipts,
        TaskType::GenerateRentStatements,
        TaskType::GenerateDocuments,
        TaskType::GenerateInventoryReports,
        TaskType::GenerateTaxReport,
        TaskType::ReviseRents,
        TaskType::RecomputeBalances,
        TaskType::ImportPayments,
        TaskType::ReconcilePayments,
        TaskType::SyncAccounting,
        TaskType::ExportAccounting,
        TaskType::EncryptDocuments,
        TaskType::ArchiveDocuments,
        TaskType::SendRentReminders,
        TaskType::SendRentNotices,
        TaskType::SendPaymentConfirmations,
        TaskType::SendLeaseExpiryAlerts,
        TaskType::SendWelcomeEmails,
        TaskType::NotifyOwners,
        TaskType::NotifyTenants,
        TaskType::RefreshStatistics,
        TaskType::UpdatePropertyIndexes,
        TaskType::CleanupExpiredInvites,
        TaskType::CleanupOrphanFiles,
        TaskType::PurgeOldBackups,
        TaskType::Backup,
        TaskType::DemoCreate,
        TaskType::DemoRefresh,
        TaskType::DemoDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::GenerateRents => "GENERATE_RENTS",
            TaskType::GenerateReceipts => "GENERATE_RECEIPTS",
            TaskType::GenerateRentStatements => "GENERATE_RENT_STATEMENTS",
            TaskType::GenerateDocuments => "GENERATE_DOCUMENTS",
            TaskType::GenerateInventoryReports => "GENERATE_INVENTORY_REPORTS",
            TaskType::GenerateTaxReport => "GENERATE_TAX_REPORT",
            TaskType::ReviseRents => "REVISE_RENTS",
            TaskType::RecomputeBalances => "RECOMPUTE_BALANCES",
            TaskType::ImportPayments => "IMPORT_PAYMENTS",
            TaskType::ReconcilePayments => "RECONCILE_PAYMENTS",
            TaskType::SyncAccounting => "SYNC_ACCOUNTING",
            TaskType::ExportAccounting => "EXPORT_ACCOUNTING",
            TaskType::EncryptDocuments => "ENCRYPT_DOCUMENTS",
            TaskType::ArchiveDocuments => "ARCHIVE_DOCUMENTS",
            TaskType::SendRentReminders => "SEND_RENT_REMINDERS",
            TaskType::SendRentNotices => "SEND_RENT_NOTICES",
            TaskType::SendPaymentConfirmations => "SEND_PAYMENT_CONFIRMATIONS",
            TaskType::SendLeaseExpiryAlerts => "SEND_LEASE_EXPIRY_ALERTS",
            TaskType::SendWelcomeEmails => "SEND_WELCOME_EMAILS",
            TaskType::NotifyOwners => "NOTIFY_OWNERS",
            TaskType::NotifyTenants => "NOTIFY_TENANTS",
            TaskType::RefreshStatistics => "REFRESH_STATISTICS",
            TaskType::UpdatePropertyIndexes => "UPDATE_PROPERTY_INDEXES",
            TaskType::CleanupExpiredInvites => "CLEANUP_EXPIRED_INVITES",
            TaskType::CleanupOrphanFiles => "CLEANUP_ORPHAN_FILES",
            TaskType::PurgeOldBackups => "PURGE_OLD_BACKUPS",
            TaskType::Backup => "BACKUP",
            TaskType::DemoCreate => "DEMO_CREATE",
            TaskType::DemoRefresh => "DEMO_REFRESH",
            TaskType::DemoDelete => "DEMO_DELETE",
        }
    }
}

impl Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown task type: {}", s))
    }
}

/// The rule governing how a task's next-run timestamp is recomputed.
///
/// Anything that is not one of the named keywords is treated as a cron
/// expression and validated at parse time, so an unparsable rule can never
/// reach the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Frequency {
    Manual,
    Once,
    Daily,
    Weekly,
    Monthly,
    Cron(String),
}

impl Frequency {
    pub fn as_str(&self) -> &str {
        match self {
            Frequency::Manual => "MANUAL",
            Frequency::Once => "ONCE",
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Cron(expr) => expr,
        }
    }

    /// Recurring frequencies keep the task eligible after every run.
    pub fn is_recurring(&self) -> bool {
        matches!(
            self,
            Frequency::Daily | Frequency::Weekly | Frequency::Monthly | Frequency::Cron(_)
        )
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for Frequency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "MANUAL" => Ok(Frequency::Manual),
            "ONCE" => Ok(Frequency::Once),
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            expr => {
                expr.parse::<cron::Schedule>()
                    .map_err(|e| format!("Invalid frequency rule '{}': {}", expr, e))?;
                Ok(Frequency::Cron(value))
            }
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Frequency::try_from(s.to_string())
    }
}

impl From<Frequency> for String {
    fn from(frequency: Frequency) -> Self {
        frequency.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Inactive,
    Active,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Inactive,
        TaskStatus::Active,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Inactive => "INACTIVE",
            TaskStatus::Active => "ACTIVE",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = String;

    fn try_from(status: String) -> Result<Self, Self::Error> {
        TaskStatus::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == status)
            .ok_or_else(|| format!("Invalid task status: {}", status))
    }
}

/// A persisted job definition plus its run-state counters.
///
/// `parameters` is an open map shared by handler inputs (e.g. `batch_size`)
/// and handler-reported metrics (e.g. `last_rents_generated`); the engine
/// never interprets its keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub task_type: TaskType,
    pub name: String,
    pub description: String,
    pub frequency: Frequency,
    pub status: TaskStatus,
    pub parameters: Map<String, Value>,
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

impl Task {
    /// Eligibility check used by the non-forced execution path: the task is
    /// active and either never scheduled or past its next-run timestamp.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Active
            && self.next_run_at.map(|at| at <= now).unwrap_or(true)
    }
}

/// What a handler reports back after running: a success flag, metrics to
/// merge into the task's parameters, and an optional human-readable summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub metrics: Map<String, Value>,
    pub message: Option<String>,
}

impl Outcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            metrics: Map::new(),
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            metrics: Map::new(),
            message: Some(message.into()),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }
}

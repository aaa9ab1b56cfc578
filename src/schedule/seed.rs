use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::schedule::types::{Frequency, TaskType};
use crate::storage::task::entity::TaskRecord;
use crate::storage::task::{StorageError, TaskStorage};

/// Default definition for one known task type: human label, description and
/// the frequency a fresh installation starts with.
pub struct TaskDefinition {
    pub task_type: TaskType,
    pub name: &'static str,
    pub description: &'static str,
    pub frequency: Frequency,
}

/// One definition per known task type, the set operational tooling expects
/// to find as rows.
pub fn default_tasks() -> Vec<TaskDefinition> {
    use Frequency::{Daily, Manual, Monthly, Weekly};
    use TaskType::*;

    vec![
        def(GenerateRents, "Generate rents", "Create the month's rent calls for every open lease", Monthly),
        def(GenerateReceipts, "Generate receipts", "Produce rent receipts for settled payments", Monthly),
        def(GenerateRentStatements, "Generate rent statements", "Produce per-owner rent statements", Monthly),
        def(GenerateDocuments, "Generate documents", "Render pending lease and notice documents", Daily),
        def(GenerateInventoryReports, "Generate inventory reports", "Produce property inventory reports", Monthly),
        def(GenerateTaxReport, "Generate tax report", "Produce the yearly rental income tax report", Manual),
        def(ReviseRents, "Revise rents", "Apply reference-index rent revisions to eligible leases", Monthly),
        def(RecomputeBalances, "Recompute balances", "Recompute tenant account balances", Daily),
        def(ImportPayments, "Import payments", "Import bank payment files", Daily),
        def(ReconcilePayments, "Reconcile payments", "Match imported payments against open rent calls", Daily),
        def(SyncAccounting, "Sync accounting", "Push journal entries to the accounting system", Daily),
        def(ExportAccounting, "Export accounting", "Export the accounting journal for download", Manual),
        def(EncryptDocuments, "Encrypt documents", "Encrypt newly uploaded documents at rest", Daily),
        def(ArchiveDocuments, "Archive documents", "Move closed-lease documents to cold storage", Weekly),
        def(SendRentReminders, "Send rent reminders", "Remind tenants of upcoming rent due dates", Weekly),
        def(SendRentNotices, "Send rent notices", "Send overdue rent notices", Weekly),
        def(SendPaymentConfirmations, "Send payment confirmations", "Confirm received payments to tenants", Daily),
        def(SendLeaseExpiryAlerts, "Send lease expiry alerts", "Alert managers about leases nearing expiry", Weekly),
        def(SendWelcomeEmails, "Send welcome emails", "Welcome newly registered tenants", Daily),
        def(NotifyOwners, "Notify owners", "Fan out pending notifications to owners", Daily),
        def(NotifyTenants, "Notify tenants", "Fan out pending notifications to tenants", Daily),
        def(RefreshStatistics, "Refresh statistics", "Refresh dashboard occupancy and arrears figures", Daily),
        def(UpdatePropertyIndexes, "Update property indexes", "Refresh the property search indexes", Daily),
        def(CleanupExpiredInvites, "Cleanup expired invites", "Delete expired tenant portal invitations", Weekly),
        def(CleanupOrphanFiles, "Cleanup orphan files", "Remove uploaded files no entity references", Weekly),
        def(PurgeOldBackups, "Purge old backups", "Delete backup archives past retention", Weekly),
        def(Backup, "Backup", "Package and store a full database backup", Daily),
        def(DemoCreate, "Create demo environment", "Provision a fresh demo tenant with sample data", Manual),
        def(DemoRefresh, "Refresh demo environment", "Reset the demo tenant to its sample data", Daily),
        def(DemoDelete, "Delete demo environment", "Tear down the demo tenant", Manual),
    ]
}

fn def(
    task_type: TaskType,
    name: &'static str,
    description: &'static str,
    frequency: Frequency,
) -> TaskDefinition {
    TaskDefinition { task_type, name, description, frequency }
}

/// Creates the missing rows, one per known task type. Idempotent: existing
/// rows are left untouched, so re-running setup never resets run state.
pub async fn seed_missing(storage: &Arc<dyn TaskStorage>) -> Result<usize, StorageError> {
    let now = Utc::now();
    let mut created = 0;

    for definition in default_tasks() {
        if storage.get_by_type(definition.task_type.as_str()).await?.is_some() {
            continue;
        }

        let record = TaskRecord {
            id: 0,
            task_type: definition.task_type.as_str().to_string(),
            name: definition.name.to_string(),
            description: definition.description.to_string(),
            frequency: definition.frequency.as_str().to_string(),
            status: "ACTIVE".to_string(),
            parameters: "{}".to_string(),
            last_run_at: None,
            next_run_at: None,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
            last_error: None,
            result: None,
            created_at: now,
            updated_at: now,
        };

        let id = storage.insert(&record).await?;
        info!("Seeded task {} ({})", id, definition.task_type);
        created += 1;
    }

    Ok(created)
}

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::TaskHandler;
use crate::schedule::types::{Outcome, TaskType};

/// Collaborator seam into the lease/rent bookkeeping. The engine only needs
/// enough of it to create one rent call per lease and period without
/// duplicating on re-run.
#[async_trait]
pub trait RentLedger: Send + Sync {
    async fn open_leases(&self) -> Result<Vec<Lease>>;

    /// True when a rent record already exists for this lease and period.
    async fn rent_exists(&self, lease_id: &str, period: &str) -> Result<bool>;

    /// Creates the rent call; `amount` is in cents.
    async fn create_rent(&self, lease_id: &str, period: &str, amount: i64) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct Lease {
    pub id: String,
    pub rent_amount: i64,
}

/// Generates the month's rent calls for every open lease.
///
/// Input parameter `period` ("YYYY-MM") selects the billing period; when
/// absent the current month is used. Reported metrics:
/// `last_period`, `last_rents_generated`, `last_rents_skipped`.
pub struct GenerateRentsHandler {
    ledger: Arc<dyn RentLedger>,
}

impl GenerateRentsHandler {
    pub fn new(ledger: Arc<dyn RentLedger>) -> Self {
        Self { ledger }
    }

    fn period_from(parameters: &Map<String, Value>) -> String {
        parameters
            .get("period")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                let now = Utc::now();
                format!("{:04}-{:02}", now.year(), now.month())
            })
    }
}

#[async_trait]
impl TaskHandler for GenerateRentsHandler {
    fn task_type(&self) -> TaskType {
        TaskType::GenerateRents
    }

    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Outcome> {
        let period = Self::period_from(parameters);
        info!("Generating rents for period {}", period);

        let leases = self.ledger.open_leases().await?;
        let mut generated: u64 = 0;
        let mut skipped: u64 = 0;

        for lease in &leases {
            // re-runs for the same period must not duplicate rent calls
            if self.ledger.rent_exists(&lease.id, &period).await? {
                skipped += 1;
                continue;
            }
            self.ledger.create_rent(&lease.id, &period, lease.rent_amount).await?;
            generated += 1;
        }

        if leases.is_empty() {
            warn!("No open leases found for period {}", period);
        }

        Ok(Outcome::succeeded(format!(
            "generated {} rents for period {} ({} already present)",
            generated, period, skipped
        ))
        .with_metric("last_period", period)
        .with_metric("last_rents_generated", generated)
        .with_metric("last_rents_skipped", skipped))
    }
}

/// In-memory ledger used by tests and demo environments.
pub struct InMemoryRentLedger {
    leases: Vec<Lease>,
    rents: Mutex<HashSet<(String, String)>>,
}

impl InMemoryRentLedger {
    pub fn new(leases: Vec<Lease>) -> Self {
        Self {
            leases,
            rents: Mutex::new(HashSet::new()),
        }
    }

    pub async fn rent_count(&self) -> usize {
        self.rents.lock().await.len()
    }
}

#[async_trait]
impl RentLedger for InMemoryRentLedger {
    async fn open_leases(&self) -> Result<Vec<Lease>> {
        Ok(self.leases.clone())
    }

    async fn rent_exists(&self, lease_id: &str, period: &str) -> Result<bool> {
        let rents = self.rents.lock().await;
        Ok(rents.contains(&(lease_id.to_string(), period.to_string())))
    }

    async fn create_rent(&self, lease_id: &str, period: &str, _amount: i64) -> Result<()> {
        let mut rents = self.rents.lock().await;
        rents.insert((lease_id.to_string(), period.to_string()));
        Ok(())
    }
}

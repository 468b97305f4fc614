// Customer Cleanup Job - Deletes customers without an order in the past year

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

use crm_shared::{DataSource, JobRunResult};

use super::runner::{settle, Settled};
use super::sink::JobLogs;
use crate::store::{CrmStore, StoreResult};

pub const NAME: &str = "customer_cleanup";
pub const INACTIVITY_DAYS: i64 = 365;

#[derive(Clone)]
pub struct CustomerCleanupJob {
    store: Arc<dyn CrmStore>,
    inactivity: Duration,
}

impl CustomerCleanupJob {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self {
            store,
            inactivity: Duration::days(INACTIVITY_DAYS),
        }
    }

    pub fn with_inactivity_days(mut self, days: i64) -> Self {
        self.inactivity = Duration::days(days);
        self
    }

    /// Orders dated exactly at the cutoff still count as activity.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.inactivity
    }

    pub async fn delete_inactive(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let cutoff = self.cutoff(now);
        let deleted = self.store.delete_inactive_customers(cutoff).await?;
        info!(deleted, %cutoff, "Deleted inactive customers");
        Ok(deleted)
    }

    pub async fn run(&self, logs: &JobLogs) -> JobRunResult {
        self.run_at(logs, Utc::now()).await
    }

    pub async fn run_at(&self, logs: &JobLogs, now: DateTime<Utc>) -> JobRunResult {
        let stamp = now.format("%Y-%m-%d %H:%M:%S").to_string();
        settle(NAME, "Customer cleanup", now, stamp.clone(), logs, self.clean(now, stamp)).await
    }

    async fn clean(&self, now: DateTime<Utc>, stamp: String) -> Settled {
        match self.delete_inactive(now).await {
            Ok(deleted) => Settled {
                record: format!("{}: Deleted {} inactive customers", stamp, deleted),
                result: JobRunResult::success(
                    NAME,
                    now,
                    DataSource::Fallback,
                    format!("Successfully deleted {} inactive customers", deleted),
                )
                .with_payload(serde_json::json!({ "deleted": deleted })),
            },
            Err(e) => {
                error!("Customer cleanup failed: {}", e);
                Settled {
                    record: format!("{}: Customer cleanup failed: {}", stamp, e),
                    result: JobRunResult::failure(NAME, now, format!("Error: {}", e)),
                }
            }
        }
    }
}

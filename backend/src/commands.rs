// Management commands - One-shot operations run from the command line

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info};

use crm_shared::{NewCustomer, NewProduct};

use crate::jobs::CustomerCleanupJob;
use crate::store::{CrmStore, StoreResult};

pub const SEED_MESSAGE: &str = "Database seeded successfully.";

/// Replaces every customer and product with the fixed demo catalog.
/// Running it again yields the same rows.
pub async fn seed(store: &dyn CrmStore) -> StoreResult<()> {
    store.reset_catalog().await?;

    store
        .create_customer(NewCustomer {
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            phone: Some("+1234567890".to_string()),
        })
        .await?;

    for (name, price, stock) in [("Laptop", Decimal::new(99999, 2), 10), ("Mouse", Decimal::new(1999, 2), 50)] {
        store
            .create_product(NewProduct { name: name.to_string(), price, stock })
            .await?;
    }

    info!("Seeded 1 customer and 2 products");
    Ok(())
}

/// Deletes customers with no order in the past year and returns the line to print.
pub async fn clean_inactive_customers(store: Arc<dyn CrmStore>, inactivity_days: i64, now: DateTime<Utc>) -> String {
    let job = CustomerCleanupJob::new(store).with_inactivity_days(inactivity_days);
    match job.delete_inactive(now).await {
        Ok(deleted) => format!("Successfully deleted {} inactive customers", deleted),
        Err(e) => {
            error!("Inactive customer cleanup failed: {}", e);
            format!("Error: {}", e)
        }
    }
}

// Low Stock Job - Restocks products that fell below the stock threshold

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crm_shared::{de, DataSource, RestockedProduct};

use super::runner::{JobContext, ScheduledJob};
use crate::remote::{queries, RemoteError};
use crate::store::StoreError;

pub const NAME: &str = "low_stock";
pub const LOW_STOCK_THRESHOLD: i32 = 10;
pub const RESTOCK_INCREMENT: i32 = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RestockOutcome {
    pub success: bool,
    pub message: String,
    pub products: Vec<RestockedProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationPayload {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    #[serde(default)]
    updated_products: Vec<UpdatedProduct>,
}

#[derive(Debug, Deserialize)]
struct UpdatedProduct {
    #[serde(deserialize_with = "de::id")]
    id: String,
    name: String,
    stock: i32,
    #[serde(deserialize_with = "de::money")]
    price: Decimal,
}

#[derive(Debug, Clone)]
pub struct LowStockJob {
    threshold: i32,
    increment: i32,
}

impl Default for LowStockJob {
    fn default() -> Self {
        Self::new(LOW_STOCK_THRESHOLD, RESTOCK_INCREMENT)
    }
}

impl LowStockJob {
    pub fn new(threshold: i32, increment: i32) -> Self {
        Self { threshold, increment }
    }
}

#[async_trait]
impl ScheduledJob for LowStockJob {
    type Output = RestockOutcome;

    fn name(&self) -> &'static str {
        NAME
    }

    fn title(&self) -> &'static str {
        "Low stock update"
    }

    fn subject(&self) -> &'static str {
        "product"
    }

    fn stamp(&self, now: DateTime<Utc>) -> String {
        now.format("%d/%m/%Y-%H:%M:%S").to_string()
    }

    async fn remote(&self, ctx: &JobContext<'_>) -> Result<RestockOutcome, RemoteError> {
        let mut response = ctx.client.send_candidates(&queries::low_stock_mutation()).await?;
        let raw = response
            .data
            .get_mut("updateLowStockProducts")
            .map(serde_json::Value::take)
            .unwrap_or_default();
        let payload: MutationPayload =
            serde_json::from_value(raw).map_err(|e| RemoteError::Shape(e.to_string()))?;

        // The mutation only reports stock after the update
        let products = payload
            .updated_products
            .into_iter()
            .map(|p| RestockedProduct {
                id: p.id,
                name: p.name,
                previous_stock: p.stock - self.increment,
                stock: p.stock,
                price: p.price,
            })
            .collect();

        Ok(RestockOutcome {
            success: payload.success,
            message: payload.message.unwrap_or_else(|| "No message".to_string()),
            products,
        })
    }

    async fn fallback(&self, ctx: &JobContext<'_>) -> Result<RestockOutcome, StoreError> {
        let products = ctx.store.restock_low_stock(self.threshold, self.increment).await?;
        let message = if products.is_empty() {
            "No products below stock threshold".to_string()
        } else {
            format!("Restocked {} products", products.len())
        };
        Ok(RestockOutcome { success: true, message, products })
    }

    fn unusable_reason(&self, output: &RestockOutcome) -> Option<String> {
        (!output.success).then(|| format!("Endpoint rejected the update: {}", output.message))
    }

    fn render(&self, ctx: &JobContext<'_>, output: &RestockOutcome, source: DataSource) -> String {
        let mut record = format!("{} Low Stock Update Results:\n", self.stamp(ctx.now));
        record.push_str(&format!("Success: {}\n", output.success));
        record.push_str(&format!("Message: {}\n", output.message));
        if source == DataSource::Fallback {
            record.push_str("Source: store fallback\n");
        }

        if output.products.is_empty() {
            record.push_str("No products were updated.\n");
        } else {
            record.push_str(&format!("Updated Products ({}):\n", output.products.len()));
            for product in &output.products {
                record.push_str(&format!(
                    "  - {}: Stock updated from {} to {} (Price: ${})\n",
                    product.name, product.previous_stock, product.stock, product.price
                ));
            }
        }

        record.push_str(&"-".repeat(50));
        record
    }

    fn summary(&self, output: &RestockOutcome, _source: DataSource) -> String {
        format!("Low stock update completed: {}", output.message)
    }

    fn payload(&self, output: &RestockOutcome) -> Option<serde_json::Value> {
        serde_json::to_value(&output.products)
            .ok()
            .map(|products| serde_json::json!({ "updated": output.products.len(), "products": products }))
    }
}

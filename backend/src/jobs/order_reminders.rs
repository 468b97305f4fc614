// Order Reminders Job - Logs a reminder for every order placed in the last week

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

use crm_shared::{DataSource, OrderDigest};

use super::runner::{JobContext, ScheduledJob};
use crate::remote::queries::{self, RemoteOrder};
use crate::remote::RemoteError;
use crate::store::StoreError;

pub const NAME: &str = "order_reminders";
pub const REMINDER_WINDOW_DAYS: i64 = 7;

/// Plain lists and relay connections are both accepted for the order root.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrderList {
    Plain(Vec<RemoteOrder>),
    Connection { edges: Vec<Edge> },
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: RemoteOrder,
}

impl OrderList {
    fn into_digests(self) -> Vec<OrderDigest> {
        match self {
            OrderList::Plain(orders) => orders.into_iter().map(OrderDigest::from).collect(),
            OrderList::Connection { edges } => edges.into_iter().map(|e| OrderDigest::from(e.node)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderRemindersJob {
    window: Duration,
}

impl Default for OrderRemindersJob {
    fn default() -> Self {
        Self { window: Duration::days(REMINDER_WINDOW_DAYS) }
    }
}

impl OrderRemindersJob {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }
}

#[async_trait]
impl ScheduledJob for OrderRemindersJob {
    type Output = Vec<OrderDigest>;

    fn name(&self) -> &'static str {
        NAME
    }

    fn title(&self) -> &'static str {
        "Order reminders"
    }

    fn subject(&self) -> &'static str {
        "order"
    }

    async fn remote(&self, ctx: &JobContext<'_>) -> Result<Vec<OrderDigest>, RemoteError> {
        let candidates = queries::orders_since_queries(self.since(ctx.now));
        let mut response = ctx.client.send_candidates(&candidates).await?;
        let root = candidates[response.candidate].root_fields[0];
        let raw = response.data.get_mut(root).map(Value::take).unwrap_or_default();
        let orders: OrderList = serde_json::from_value(raw).map_err(|e| RemoteError::Shape(e.to_string()))?;
        Ok(orders.into_digests())
    }

    async fn fallback(&self, ctx: &JobContext<'_>) -> Result<Vec<OrderDigest>, StoreError> {
        ctx.store.orders_since(self.since(ctx.now)).await
    }

    fn render(&self, ctx: &JobContext<'_>, orders: &Vec<OrderDigest>, source: DataSource) -> String {
        let stamp = self.stamp(ctx.now);
        if orders.is_empty() {
            return format!("{}: No recent orders to remind", stamp);
        }

        let mut record = format!("{}: Processing {} recent orders", stamp, orders.len());
        if source == DataSource::Fallback {
            record.push_str(" (using store fallback)");
        }
        record.push('\n');
        for order in orders {
            record.push_str(&format!(
                "  - Order {}: {} ({}), Amount: ${}, Date: {}\n",
                order.id,
                order.customer_name,
                order.customer_email,
                order.total_amount,
                order.order_date.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        record.push_str(&format!("{}: Order reminders processed!", stamp));
        record
    }

    fn summary(&self, orders: &Vec<OrderDigest>, _source: DataSource) -> String {
        if orders.is_empty() {
            "No recent orders to remind".to_string()
        } else {
            format!("Order reminders processed: {} orders", orders.len())
        }
    }

    fn payload(&self, orders: &Vec<OrderDigest>) -> Option<Value> {
        Some(serde_json::json!({ "reminders": orders.len() }))
    }

    fn render_failure(&self, ctx: &JobContext<'_>, remote: &str, fallback: &StoreError) -> String {
        format!("{}: {}; store fallback failed: {}", self.stamp(ctx.now), remote, fallback)
    }
}

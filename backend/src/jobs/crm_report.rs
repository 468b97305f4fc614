// CRM Report Job - Weekly totals plus the most recent orders

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crm_shared::{de, CrmReport, CrmTotals, DataSource, OrderDigest};

use super::runner::{JobContext, ScheduledJob};
use crate::remote::queries::{self, RemoteOrder, RECENT_ORDER_LIMIT};
use crate::remote::RemoteError;
use crate::store::StoreError;

pub const NAME: &str = "crm_report";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregateAnswer {
    total_customers: i64,
    total_orders: i64,
    #[serde(deserialize_with = "de::money")]
    total_revenue: Decimal,
    #[serde(default)]
    recent_orders: Vec<RemoteOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionAnswer {
    all_customers: Counted,
    all_orders: OrderConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Counted {
    total_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderConnection {
    total_count: i64,
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: RemoteOrder,
}

#[derive(Debug, Clone)]
pub struct CrmReportJob {
    recent_limit: i64,
}

impl Default for CrmReportJob {
    fn default() -> Self {
        Self::new(RECENT_ORDER_LIMIT)
    }
}

impl CrmReportJob {
    pub fn new(recent_limit: i64) -> Self {
        Self { recent_limit }
    }

    fn from_aggregates(&self, data: Value) -> Result<CrmReport, RemoteError> {
        let answer: AggregateAnswer = serde_json::from_value(data).map_err(|e| RemoteError::Shape(e.to_string()))?;
        Ok(CrmReport {
            totals: CrmTotals {
                customers: answer.total_customers,
                orders: answer.total_orders,
                revenue: answer.total_revenue,
            },
            recent_orders: answer
                .recent_orders
                .into_iter()
                .take(self.recent_limit.max(0) as usize)
                .map(OrderDigest::from)
                .collect(),
        })
    }

    fn from_connections(&self, data: Value) -> Result<CrmReport, RemoteError> {
        let answer: ConnectionAnswer = serde_json::from_value(data).map_err(|e| RemoteError::Shape(e.to_string()))?;

        let mut orders: Vec<OrderDigest> = answer
            .all_orders
            .edges
            .into_iter()
            .map(|edge| OrderDigest::from(edge.node))
            .collect();
        let revenue: Decimal = orders.iter().map(|o| o.total_amount).sum();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        orders.truncate(self.recent_limit.max(0) as usize);

        Ok(CrmReport {
            totals: CrmTotals {
                customers: answer.all_customers.total_count,
                orders: answer.all_orders.total_count,
                revenue,
            },
            recent_orders: orders,
        })
    }
}

/// Two-decimal money rendering used in records and status strings.
pub fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

#[async_trait]
impl ScheduledJob for CrmReportJob {
    type Output = CrmReport;

    fn name(&self) -> &'static str {
        NAME
    }

    fn title(&self) -> &'static str {
        "CRM report"
    }

    fn subject(&self) -> &'static str {
        "order"
    }

    async fn remote(&self, ctx: &JobContext<'_>) -> Result<CrmReport, RemoteError> {
        let response = ctx.client.send_candidates(&queries::report_queries()).await?;
        match response.candidate {
            0 => self.from_aggregates(response.data),
            _ => self.from_connections(response.data),
        }
    }

    async fn fallback(&self, ctx: &JobContext<'_>) -> Result<CrmReport, StoreError> {
        ctx.store.report(self.recent_limit).await
    }

    fn render(&self, ctx: &JobContext<'_>, output: &CrmReport, source: DataSource) -> String {
        let totals = &output.totals;
        let mut record = format!(
            "{} - Report: {} customers, {} orders, ${} revenue",
            self.stamp(ctx.now),
            totals.customers,
            totals.orders,
            money(totals.revenue)
        );
        if source == DataSource::Fallback {
            record.push_str(" (using store fallback)");
        }
        record.push('\n');

        if !output.recent_orders.is_empty() {
            record.push_str("  Recent Orders:\n");
            for order in &output.recent_orders {
                record.push_str(&format!(
                    "    - {}: ${} on {}\n",
                    order.customer_name,
                    money(order.total_amount),
                    order.order_date.format("%Y-%m-%d")
                ));
            }
        }

        record.push_str(&"-".repeat(60));
        record
    }

    fn summary(&self, output: &CrmReport, _source: DataSource) -> String {
        format!(
            "CRM report generated: {} customers, {} orders, ${} revenue",
            output.totals.customers,
            output.totals.orders,
            money(output.totals.revenue)
        )
    }

    fn payload(&self, output: &CrmReport) -> Option<Value> {
        serde_json::to_value(output).ok()
    }
}

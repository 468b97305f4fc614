use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub total_amount: Decimal,
    pub order_date: DateTime<Utc>,
}

impl Order {
    /// Order totals are the plain sum of the linked products' prices.
    pub fn total_for(products: &[Product]) -> Decimal {
        products.iter().map(|p| p.price).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: i64,
    pub product_ids: Vec<i64>,
    /// Defaults to the creation time when absent.
    pub order_date: Option<DateTime<Utc>>,
}

/// An order flattened together with the customer it belongs to. Both the
/// GraphQL endpoint and the store produce this shape for reminders and reports.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDigest {
    pub id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub total_amount: Decimal,
    pub order_date: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestockedProduct {
    pub id: String,
    pub name: String,
    pub previous_stock: i32,
    pub stock: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CrmTotals {
    pub customers: i64,
    pub orders: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CrmReport {
    pub totals: CrmTotals,
    pub recent_orders: Vec<OrderDigest>,
}

/// Where a job got its data from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Remote,
    Fallback,
    None,
}

/// Outcome of one scheduled job invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRunResult {
    pub job: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub message: String,
    pub source: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl JobRunResult {
    pub fn success(job: &str, timestamp: DateTime<Utc>, source: DataSource, message: impl Into<String>) -> Self {
        Self {
            job: job.to_string(),
            timestamp,
            success: true,
            message: message.into(),
            source,
            payload: None,
        }
    }

    pub fn failure(job: &str, timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            job: job.to_string(),
            timestamp,
            success: false,
            message: message.into(),
            source: DataSource::None,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Serde helpers for values the GraphQL layer encodes loosely.
pub mod de {
    use super::*;
    use std::str::FromStr;

    /// Money arrives as `"999.99"` from decimal fields and as `999.99` from float fields.
    pub fn money<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match &value {
            serde_json::Value::String(s) => Decimal::from_str(s.trim()).map_err(serde::de::Error::custom),
            serde_json::Value::Number(n) => {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .map_err(serde::de::Error::custom)
            }
            serde_json::Value::Null => Ok(Decimal::ZERO),
            other => Err(serde::de::Error::custom(format!("expected money, got {}", other))),
        }
    }

    /// Relay ids are strings, plain model ids are numbers; both become strings.
    pub fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(s),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!("expected id, got {}", other))),
        }
    }

    /// Accepts RFC 3339 timestamps and naive ones, which are read as UTC.
    pub fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
            .ok_or_else(|| format!("unrecognised timestamp: {}", raw))
    }
}

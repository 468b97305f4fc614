// CRM Store - Direct access to customers, products and orders
//
// The jobs reach this layer only when the GraphQL endpoint cannot answer;
// the cleanup job, the seed routine and the management commands use it directly.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crm_shared::{
    CrmReport, CrmTotals, Customer, NewCustomer, NewOrder, NewProduct, Order, OrderDigest, Product,
    RestockedProduct,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Invalid(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CrmStore: Send + Sync {
    async fn create_customer(&self, input: NewCustomer) -> StoreResult<Customer>;
    async fn create_product(&self, input: NewProduct) -> StoreResult<Product>;
    /// Links the products and stores the sum of their prices as the order total.
    async fn create_order(&self, input: NewOrder) -> StoreResult<Order>;

    async fn list_customers(&self) -> StoreResult<Vec<Customer>>;
    async fn list_products(&self) -> StoreResult<Vec<Product>>;

    async fn count_customers(&self) -> StoreResult<i64>;
    async fn count_orders(&self) -> StoreResult<i64>;
    /// Sum of all order totals, zero when there are no orders.
    async fn total_revenue(&self) -> StoreResult<Decimal>;
    /// Newest first.
    async fn recent_orders(&self, limit: i64) -> StoreResult<Vec<OrderDigest>>;
    /// Orders with `order_date >= since`, newest first.
    async fn orders_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<OrderDigest>>;

    /// Adds `increment` to every product whose stock is below `threshold`.
    async fn restock_low_stock(&self, threshold: i32, increment: i32) -> StoreResult<Vec<RestockedProduct>>;
    /// Deletes customers without any order dated at or after `cutoff`.
    async fn delete_inactive_customers(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
    /// Removes every customer (and with them their orders) and every product.
    async fn reset_catalog(&self) -> StoreResult<()>;

    async fn totals(&self) -> StoreResult<CrmTotals> {
        Ok(CrmTotals {
            customers: self.count_customers().await?,
            orders: self.count_orders().await?,
            revenue: self.total_revenue().await?,
        })
    }

    async fn report(&self, recent_limit: i64) -> StoreResult<CrmReport> {
        Ok(CrmReport {
            totals: self.totals().await?,
            recent_orders: self.recent_orders(recent_limit).await?,
        })
    }
}

// PostgreSQL implementation of the CRM store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

use crm_shared::{Customer, NewCustomer, NewOrder, NewProduct, Order, OrderDigest, Product, RestockedProduct};

use super::{CrmStore, StoreError, StoreResult};

const DIGEST_SELECT: &str = r#"
    SELECT
        o.id::text AS id,
        c.name AS customer_name,
        c.email AS customer_email,
        o.total_amount,
        o.order_date
    FROM orders o
    JOIN customers c ON o.customer_id = c.id
"#;

#[derive(Debug, Clone)]
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db_pool
    }
}

#[async_trait]
impl CrmStore for PgStore {
    async fn create_customer(&self, input: NewCustomer) -> StoreResult<Customer> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (name, email, phone)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, phone, created_at
            "#
        )
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(customer)
    }

    async fn create_product(&self, input: NewProduct) -> StoreResult<Product> {
        if input.stock < 0 {
            return Err(StoreError::Invalid("stock cannot be negative".to_string()));
        }

        let product = sqlx::query_as::<_, Product>(
            "INSERT INTO products (name, price, stock) VALUES ($1, $2, $3) RETURNING id, name, price, stock"
        )
        .bind(&input.name)
        .bind(input.price)
        .bind(input.stock)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(product)
    }

    async fn create_order(&self, input: NewOrder) -> StoreResult<Order> {
        let mut tx = self.db_pool.begin().await?;

        let customer_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM customers WHERE id = $1)")
            .bind(input.customer_id)
            .fetch_one(&mut *tx)
            .await?;
        if !customer_exists {
            return Err(StoreError::NotFound(format!("Customer {}", input.customer_id)));
        }

        let products = sqlx::query_as::<_, Product>(
            "SELECT id, name, price, stock FROM products WHERE id = ANY($1)"
        )
        .bind(&input.product_ids)
        .fetch_all(&mut *tx)
        .await?;

        if let Some(missing) = input.product_ids.iter().find(|id| !products.iter().any(|p| p.id == **id)) {
            return Err(StoreError::NotFound(format!("Product {}", missing)));
        }

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (customer_id, total_amount, order_date)
            VALUES ($1, $2, COALESCE($3, NOW()))
            RETURNING id, customer_id, total_amount, order_date
            "#
        )
        .bind(input.customer_id)
        .bind(Order::total_for(&products))
        .bind(input.order_date)
        .fetch_one(&mut *tx)
        .await?;

        for product in &products {
            sqlx::query("INSERT INTO order_products (order_id, product_id) VALUES ($1, $2)")
                .bind(order.id)
                .bind(product.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, phone, created_at FROM customers ORDER BY id"
        )
        .fetch_all(&self.db_pool)
        .await?;
        Ok(customers)
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>("SELECT id, name, price, stock FROM products ORDER BY id")
            .fetch_all(&self.db_pool)
            .await?;
        Ok(products)
    }

    async fn count_customers(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.db_pool)
            .await?;
        Ok(count)
    }

    async fn count_orders(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.db_pool)
            .await?;
        Ok(count)
    }

    async fn total_revenue(&self) -> StoreResult<Decimal> {
        let total: Decimal = sqlx::query_scalar("SELECT COALESCE(SUM(total_amount), 0) FROM orders")
            .fetch_one(&self.db_pool)
            .await?;
        Ok(total)
    }

    async fn recent_orders(&self, limit: i64) -> StoreResult<Vec<OrderDigest>> {
        let orders = sqlx::query_as::<_, OrderDigest>(&format!(
            "{} ORDER BY o.order_date DESC, o.id DESC LIMIT $1",
            DIGEST_SELECT
        ))
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(orders)
    }

    async fn orders_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<OrderDigest>> {
        let orders = sqlx::query_as::<_, OrderDigest>(&format!(
            "{} WHERE o.order_date >= $1 ORDER BY o.order_date DESC, o.id DESC",
            DIGEST_SELECT
        ))
        .bind(since)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(orders)
    }

    async fn restock_low_stock(&self, threshold: i32, increment: i32) -> StoreResult<Vec<RestockedProduct>> {
        let restocked = sqlx::query_as::<_, RestockedProduct>(
            r#"
            UPDATE products
            SET stock = stock + $2
            WHERE stock < $1
            RETURNING id::text AS id, name, stock - $2 AS previous_stock, stock, price
            "#
        )
        .bind(threshold)
        .bind(increment)
        .fetch_all(&self.db_pool)
        .await?;

        if !restocked.is_empty() {
            info!("Restocked {} products below {} units", restocked.len(), threshold);
        }

        Ok(restocked)
    }

    async fn delete_inactive_customers(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM customers c
            WHERE NOT EXISTS (
                SELECT 1 FROM orders o
                WHERE o.customer_id = c.id
                    AND o.order_date >= $1
            )
            "#
        )
        .bind(cutoff)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn reset_catalog(&self) -> StoreResult<()> {
        let mut tx = self.db_pool.begin().await?;
        sqlx::query("DELETE FROM customers").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM products").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

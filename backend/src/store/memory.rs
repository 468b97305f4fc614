// In-memory CRM store used by tests and `--in-memory` dry runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crm_shared::{Customer, NewCustomer, NewOrder, NewProduct, Order, OrderDigest, Product, RestockedProduct};

use super::{CrmStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    customers: Vec<Customer>,
    products: Vec<Product>,
    orders: Vec<Order>,
    order_products: HashMap<i64, Vec<i64>>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn digest(&self, order: &Order) -> OrderDigest {
        let customer = self.customers.iter().find(|c| c.id == order.customer_id);
        OrderDigest {
            id: order.id.to_string(),
            customer_name: customer.map(|c| c.name.clone()).unwrap_or_default(),
            customer_email: customer.map(|c| c.email.clone()).unwrap_or_default(),
            total_amount: order.total_amount,
            order_date: order.order_date,
        }
    }

    fn digests_newest_first<'a>(&self, orders: impl Iterator<Item = &'a Order>) -> Vec<OrderDigest> {
        let mut selected: Vec<&Order> = orders.collect();
        selected.sort_by(|a, b| b.order_date.cmp(&a.order_date).then(b.id.cmp(&a.id)));
        selected.into_iter().map(|o| self.digest(o)).collect()
    }
}

/// Mirrors the Postgres store's semantics, including cascading deletes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stock for a product, if it exists.
    pub async fn stock_of(&self, product_id: i64) -> Option<i32> {
        let tables = self.tables.read().await;
        tables.products.iter().find(|p| p.id == product_id).map(|p| p.stock)
    }

    /// Products linked to an order.
    pub async fn order_products(&self, order_id: i64) -> Vec<i64> {
        let tables = self.tables.read().await;
        tables.order_products.get(&order_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn create_customer(&self, input: NewCustomer) -> StoreResult<Customer> {
        let mut tables = self.tables.write().await;
        if tables.customers.iter().any(|c| c.email == input.email) {
            return Err(StoreError::Invalid(format!("email {} already exists", input.email)));
        }

        let customer = Customer {
            id: tables.next_id(),
            name: input.name,
            email: input.email,
            phone: input.phone,
            created_at: Utc::now(),
        };
        tables.customers.push(customer.clone());
        Ok(customer)
    }

    async fn create_product(&self, input: NewProduct) -> StoreResult<Product> {
        if input.stock < 0 {
            return Err(StoreError::Invalid("stock cannot be negative".to_string()));
        }

        let mut tables = self.tables.write().await;
        let product = Product {
            id: tables.next_id(),
            name: input.name,
            price: input.price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            stock: input.stock,
        };
        tables.products.push(product.clone());
        Ok(product)
    }

    async fn create_order(&self, input: NewOrder) -> StoreResult<Order> {
        let mut tables = self.tables.write().await;

        if !tables.customers.iter().any(|c| c.id == input.customer_id) {
            return Err(StoreError::NotFound(format!("Customer {}", input.customer_id)));
        }

        let mut products = Vec::with_capacity(input.product_ids.len());
        for id in &input.product_ids {
            match tables.products.iter().find(|p| p.id == *id) {
                Some(p) if !products.iter().any(|q: &Product| q.id == p.id) => products.push(p.clone()),
                Some(_) => {}
                None => return Err(StoreError::NotFound(format!("Product {}", id))),
            }
        }

        let order = Order {
            id: tables.next_id(),
            customer_id: input.customer_id,
            total_amount: Order::total_for(&products),
            order_date: input.order_date.unwrap_or_else(Utc::now),
        };
        tables.order_products.insert(order.id, products.iter().map(|p| p.id).collect());
        tables.orders.push(order.clone());
        Ok(order)
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        Ok(self.tables.read().await.customers.clone())
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        Ok(self.tables.read().await.products.clone())
    }

    async fn count_customers(&self) -> StoreResult<i64> {
        Ok(self.tables.read().await.customers.len() as i64)
    }

    async fn count_orders(&self) -> StoreResult<i64> {
        Ok(self.tables.read().await.orders.len() as i64)
    }

    async fn total_revenue(&self) -> StoreResult<Decimal> {
        Ok(self.tables.read().await.orders.iter().map(|o| o.total_amount).sum())
    }

    async fn recent_orders(&self, limit: i64) -> StoreResult<Vec<OrderDigest>> {
        let tables = self.tables.read().await;
        let mut digests = tables.digests_newest_first(tables.orders.iter());
        digests.truncate(limit.max(0) as usize);
        Ok(digests)
    }

    async fn orders_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<OrderDigest>> {
        let tables = self.tables.read().await;
        Ok(tables.digests_newest_first(tables.orders.iter().filter(|o| o.order_date >= since)))
    }

    async fn restock_low_stock(&self, threshold: i32, increment: i32) -> StoreResult<Vec<RestockedProduct>> {
        let mut tables = self.tables.write().await;
        let restocked = tables
            .products
            .iter_mut()
            .filter(|p| p.stock < threshold)
            .map(|p| {
                let previous_stock = p.stock;
                p.stock += increment;
                RestockedProduct {
                    id: p.id.to_string(),
                    name: p.name.clone(),
                    previous_stock,
                    stock: p.stock,
                    price: p.price,
                }
            })
            .collect();
        Ok(restocked)
    }

    async fn delete_inactive_customers(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;

        let inactive: Vec<i64> = tables
            .customers
            .iter()
            .filter(|c| {
                !tables
                    .orders
                    .iter()
                    .any(|o| o.customer_id == c.id && o.order_date >= cutoff)
            })
            .map(|c| c.id)
            .collect();

        tables.customers.retain(|c| !inactive.contains(&c.id));
        let dropped: Vec<i64> = tables
            .orders
            .iter()
            .filter(|o| inactive.contains(&o.customer_id))
            .map(|o| o.id)
            .collect();
        tables.orders.retain(|o| !inactive.contains(&o.customer_id));
        for id in dropped {
            tables.order_products.remove(&id);
        }

        Ok(inactive.len() as u64)
    }

    async fn reset_catalog(&self) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.customers.clear();
        tables.products.clear();
        tables.orders.clear();
        tables.order_products.clear();
        Ok(())
    }
}

// End-to-end job runs against a mock GraphQL endpoint and the in-memory store

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use wiremock::ResponseTemplate;

use crm_shared::DataSource;

use super::super::fixtures::*;
use super::super::helpers::*;
use super::super::{memory_logs, TestContext};
use crate::jobs::{CrmReportJob, CustomerCleanupJob, HeartbeatJob, LowStockJob, OrderRemindersJob};
use crate::store::{CrmStore, MemoryStore};

#[tokio::test]
async fn test_heartbeat_records_responsive_endpoint() {
    let ctx = TestContext::new().await;
    graphql_request("hello")
        .respond_with(graphql_data(json!({ "hello": "Hello, GraphQL!" })))
        .mount(&ctx.server)
        .await;
    let (logs, log, _errors) = memory_logs();
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 8, 5, 0).unwrap();

    let result = HeartbeatJob::new(ctx.client().clone()).run_at(&logs, now).await;

    assert!(result.success);
    assert_eq!(result.message, "Heartbeat logged: 01/03/2025-08:05:00 CRM is alive");
    assert_eq!(
        log.records(),
        vec!["01/03/2025-08:05:00 CRM is alive\n01/03/2025-08:05:00 GraphQL endpoint is responsive\n".to_string()]
    );
}

#[tokio::test]
async fn test_heartbeat_succeeds_when_endpoint_is_down() {
    let runner = TestContext::unreachable(Arc::new(MemoryStore::new()));
    let (logs, log, _errors) = memory_logs();

    let result = HeartbeatJob::new(runner.client().clone()).run(&logs).await;

    assert!(result.success);
    assert_eq!(result.source, DataSource::None);
    assert!(log.contents().contains("GraphQL endpoint check failed"));
}

#[tokio::test]
async fn test_low_stock_uses_mutation_result() {
    let ctx = TestContext::new().await;
    graphql_request("updateLowStockProducts")
        .respond_with(graphql_data(json!({
            "updateLowStockProducts": {
                "success": true,
                "message": "Updated 1 products",
                "updatedProducts": [{ "id": "UHJvZHVjdDox", "name": "Laptop", "stock": 15, "price": "999.99" }]
            }
        })))
        .expect(1)
        .mount(&ctx.server)
        .await;
    let (logs, log, _errors) = memory_logs();

    let result = ctx.runner.run(&LowStockJob::default(), &logs).await;

    assert!(result.success);
    assert_eq!(result.source, DataSource::Remote);
    assert_eq!(result.message, "Low stock update completed: Updated 1 products");
    let record = log.contents();
    assert!(record.contains("Laptop: Stock updated from 5 to 15 (Price: $999.99)"));
    assert!(record.trim_end().ends_with(&"-".repeat(50)));
}

#[tokio::test]
async fn test_low_stock_falls_back_when_mutation_reports_failure() {
    let ctx = TestContext::new().await;
    graphql_request("updateLowStockProducts")
        .respond_with(graphql_data(json!({
            "updateLowStockProducts": { "success": false, "message": "Permission denied", "updatedProducts": [] }
        })))
        .mount(&ctx.server)
        .await;
    let low = insert_product(ctx.store.as_ref(), "Cable", "4.99", 3).await.unwrap();
    let (logs, log, _errors) = memory_logs();

    let result = ctx.runner.run(&LowStockJob::default(), &logs).await;

    assert_eq!(result.source, DataSource::Fallback);
    assert_eq!(ctx.store.stock_of(low.id).await, Some(13));
    assert!(log.contents().contains("Source: store fallback"));
}

#[tokio::test]
async fn test_low_stock_failure_carries_endpoint_rejection() {
    let ctx = TestContext::new().await;
    graphql_request("updateLowStockProducts")
        .respond_with(graphql_data(json!({
            "updateLowStockProducts": { "success": false, "message": "Permission denied", "updatedProducts": [] }
        })))
        .mount(&ctx.server)
        .await;
    let runner = crate::jobs::JobRunner::new(ctx.client().clone(), offline_store(), super::super::fast_retry());
    let (logs, log, _errors) = memory_logs();

    let result = runner.run(&LowStockJob::default(), &logs).await;

    assert!(!result.success);
    assert!(result.message.contains("Endpoint rejected the update: Permission denied"), "{}", result.message);
    assert!(log.contents().contains("Permission denied"));
}

#[tokio::test]
async fn test_low_stock_with_nothing_to_restock() {
    let store = Arc::new(MemoryStore::new());
    insert_product(store.as_ref(), "Mouse", "19.99", 50).await.unwrap();
    let runner = TestContext::unreachable(store.clone());
    let (logs, log, _errors) = memory_logs();

    let result = runner.run(&LowStockJob::default(), &logs).await;

    assert!(result.success);
    assert!(log.contents().contains("No products were updated."));
    assert_eq!(result.payload.unwrap()["updated"], 0);
}

#[tokio::test]
async fn test_report_revenue_matches_on_both_paths() {
    let store = Arc::new(MemoryStore::new());
    let customer = insert_customer(store.as_ref()).await.unwrap();
    let laptop = insert_product(store.as_ref(), "Laptop", "999.99", 10).await.unwrap();
    let mouse = insert_product(store.as_ref(), "Mouse", "19.99", 50).await.unwrap();
    let now = Utc::now();
    insert_order(store.as_ref(), &customer, &[&laptop, &mouse], now - Duration::days(2)).await.unwrap();
    insert_order(store.as_ref(), &customer, &[&mouse], now - Duration::days(1)).await.unwrap();

    let (logs, log, _errors) = memory_logs();
    let fallback = TestContext::unreachable(store.clone()).run(&CrmReportJob::default(), &logs).await;
    assert_eq!(fallback.source, DataSource::Fallback);
    assert_eq!(fallback.message, "CRM report generated: 1 customers, 2 orders, $1039.97 revenue");
    assert!(log.contents().contains(" (using store fallback)"));

    let ctx = TestContext::new().await;
    graphql_request("totalCustomers")
        .respond_with(graphql_data(json!({
            "totalCustomers": 1,
            "totalOrders": 2,
            "totalRevenue": "1039.97",
            "recentOrders": [
                { "id": "2", "totalAmount": "19.99", "orderDate": (now - Duration::days(1)).to_rfc3339(), "customer": { "name": customer.name, "email": customer.email } },
                { "id": "1", "totalAmount": "1019.98", "orderDate": (now - Duration::days(2)).to_rfc3339(), "customer": { "name": customer.name, "email": customer.email } }
            ]
        })))
        .mount(&ctx.server)
        .await;
    let (logs, log, _errors) = memory_logs();
    let remote = ctx.runner.run(&CrmReportJob::default(), &logs).await;

    assert_eq!(remote.source, DataSource::Remote);
    assert_eq!(remote.message, fallback.message);
    assert_eq!(remote.payload.unwrap()["totals"], fallback.payload.unwrap()["totals"]);
    assert!(log.contents().contains("  Recent Orders:\n"));
    assert!(log.contents().contains(&format!("    - {}: $19.99 on", customer.name)));
}

#[tokio::test]
async fn test_report_on_empty_data_is_zero_revenue() {
    let ctx = TestContext::new().await;
    graphql_request("totalCustomers")
        .respond_with(graphql_data(json!({
            "totalCustomers": 0, "totalOrders": 0, "totalRevenue": 0, "recentOrders": []
        })))
        .mount(&ctx.server)
        .await;
    let (logs, log, _errors) = memory_logs();
    let now = Utc.with_ymd_and_hms(2025, 3, 3, 6, 0, 0).unwrap();

    let result = ctx.runner.run_at(&CrmReportJob::default(), &logs, now).await;

    assert_eq!(result.source, DataSource::Remote);
    assert_eq!(
        log.contents(),
        format!("2025-03-03 06:00:00 - Report: 0 customers, 0 orders, $0.00 revenue\n{}\n", "-".repeat(60))
    );
}

#[tokio::test]
async fn test_reminders_from_second_candidate() {
    let ctx = TestContext::new().await;
    graphql_request("orders(filter")
        .respond_with(ResponseTemplate::new(400))
        .mount(&ctx.server)
        .await;
    graphql_request("allOrders(filter")
        .respond_with(graphql_data(json!({
            "allOrders": [{
                "id": 12,
                "customer": { "email": "ada@example.com", "name": "Ada" },
                "orderDate": "2025-03-06T10:00:00",
                "totalAmount": 19.99
            }]
        })))
        .mount(&ctx.server)
        .await;
    let (logs, log, _errors) = memory_logs();
    let now = Utc.with_ymd_and_hms(2025, 3, 8, 8, 0, 0).unwrap();

    let result = ctx.runner.run_at(&OrderRemindersJob::default(), &logs, now).await;

    assert_eq!(result.source, DataSource::Remote);
    assert_eq!(
        log.contents(),
        "2025-03-08 08:00:00: Processing 1 recent orders\n\
         \x20 - Order 12: Ada (ada@example.com), Amount: $19.99, Date: 2025-03-06 10:00:00\n\
         2025-03-08 08:00:00: Order reminders processed!\n"
    );
}

#[tokio::test]
async fn test_reminders_fall_back_to_store_window() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc.with_ymd_and_hms(2025, 3, 8, 8, 0, 0).unwrap();
    let customer = insert_customer(store.as_ref()).await.unwrap();
    let product = insert_product(store.as_ref(), "Mouse", "19.99", 50).await.unwrap();
    insert_order(store.as_ref(), &customer, &[&product], now - Duration::days(7)).await.unwrap();
    insert_order(store.as_ref(), &customer, &[&product], now - Duration::days(8)).await.unwrap();
    let (logs, log, _errors) = memory_logs();

    let result = TestContext::unreachable(store).run_at(&OrderRemindersJob::default(), &logs, now).await;

    assert!(result.success);
    assert_eq!(result.source, DataSource::Fallback);
    assert!(log.contents().contains("Processing 1 recent orders (using store fallback)"));
}

#[tokio::test]
async fn test_reminders_with_no_orders() {
    let runner = TestContext::unreachable(Arc::new(MemoryStore::new()));
    let (logs, log, _errors) = memory_logs();
    let now = Utc.with_ymd_and_hms(2025, 3, 8, 8, 0, 0).unwrap();

    let result = runner.run_at(&OrderRemindersJob::default(), &logs, now).await;

    assert!(result.success);
    assert_eq!(log.contents(), "2025-03-08 08:00:00: No recent orders to remind\n");
}

#[tokio::test]
async fn test_reminders_terminal_failure_line() {
    let runner = TestContext::unreachable(offline_store());
    let (logs, log, _errors) = memory_logs();
    let now = Utc.with_ymd_and_hms(2025, 3, 8, 8, 0, 0).unwrap();

    let result = runner.run_at(&OrderRemindersJob::default(), &logs, now).await;

    assert!(!result.success);
    let contents = log.contents();
    assert!(contents.starts_with("2025-03-08 08:00:00: Failed to reach GraphQL server after 3 attempts"));
    assert!(contents.contains("; store fallback failed: "));
}

#[tokio::test]
async fn test_cleanup_job_logs_count() {
    let store = Arc::new(MemoryStore::new());
    insert_customer(store.as_ref()).await.unwrap();
    let (logs, log, _errors) = memory_logs();
    let now = Utc.with_ymd_and_hms(2025, 3, 2, 2, 0, 0).unwrap();

    let result = CustomerCleanupJob::new(store.clone()).run_at(&logs, now).await;

    assert!(result.success);
    assert_eq!(result.message, "Successfully deleted 1 inactive customers");
    assert_eq!(log.contents(), "2025-03-02 02:00:00: Deleted 1 inactive customers\n");
    assert_eq!(store.count_customers().await.unwrap(), 0);
}

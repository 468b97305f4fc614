// Unit tests for the job runner: retry, fallback, and exactly-once logging

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crm_shared::DataSource;

use super::super::fixtures::*;
use super::super::helpers::offline_store;
use super::super::{memory_logs, TestContext};
use crate::jobs::{JobContext, JobLogs, LowStockJob, MemorySink, ScheduledJob};
use crate::remote::RemoteError;
use crate::store::{CrmStore, MemoryStore, StoreError};

/// Counts remote attempts and answers from a fixed fallback value.
struct ProbeJob {
    calls: AtomicU32,
    remote: fn() -> Result<u32, RemoteError>,
}

impl ProbeJob {
    fn new(remote: fn() -> Result<u32, RemoteError>) -> Self {
        Self { calls: AtomicU32::new(0), remote }
    }
}

#[async_trait]
impl ScheduledJob for ProbeJob {
    type Output = u32;

    fn name(&self) -> &'static str {
        "probe"
    }

    fn title(&self) -> &'static str {
        "Probe"
    }

    fn subject(&self) -> &'static str {
        "probe"
    }

    async fn remote(&self, _ctx: &JobContext<'_>) -> Result<u32, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.remote)()
    }

    async fn fallback(&self, ctx: &JobContext<'_>) -> Result<u32, StoreError> {
        Ok(ctx.store.count_customers().await? as u32 + 100)
    }

    fn render(&self, _ctx: &JobContext<'_>, output: &u32, source: DataSource) -> String {
        format!("value {} from {:?}", output, source)
    }

    fn summary(&self, output: &u32, _source: DataSource) -> String {
        format!("Probe finished: {}", output)
    }
}

#[tokio::test]
async fn test_connectivity_failures_retry_then_fall_back() {
    let ctx = TestContext::new().await;
    let job = ProbeJob::new(|| Err(RemoteError::Connectivity("connection refused".into())));
    let (logs, log, errors) = memory_logs();

    let result = ctx.runner.run(&job, &logs).await;

    assert_eq!(job.calls.load(Ordering::SeqCst), 3);
    assert!(result.success);
    assert_eq!(result.source, DataSource::Fallback);
    assert_eq!(result.message, "Probe finished: 100");
    assert_eq!(log.records(), vec!["value 100 from Fallback\n".to_string()]);
    assert!(errors.records().is_empty());
}

#[tokio::test]
async fn test_application_error_falls_back_without_retry() {
    let ctx = TestContext::new().await;
    let job = ProbeJob::new(|| Err(RemoteError::Application(vec!["Cannot query field".into()])));
    let (logs, log, _errors) = memory_logs();

    let result = ctx.runner.run(&job, &logs).await;

    assert_eq!(job.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.source, DataSource::Fallback);
    assert_eq!(log.records().len(), 1);
}

#[tokio::test]
async fn test_remote_success_skips_fallback() {
    let ctx = TestContext::new().await;
    let job = ProbeJob::new(|| Ok(7));
    let (logs, log, _errors) = memory_logs();

    let result = ctx.runner.run(&job, &logs).await;

    assert_eq!(result.source, DataSource::Remote);
    assert_eq!(log.contents(), "value 7 from Remote\n");
}

#[tokio::test]
async fn test_both_paths_failing_logs_one_failure_record() {
    let runner = TestContext::unreachable(offline_store());
    let job = ProbeJob::new(|| Err(RemoteError::Connectivity("connection refused".into())));
    let (logs, log, _errors) = memory_logs();
    let now = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();

    let result = runner.run_at(&job, &logs, now).await;

    assert!(!result.success);
    assert_eq!(result.source, DataSource::None);
    let records = log.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].starts_with("2025-03-01 08:00:00 Probe failed: Failed to reach GraphQL server after 3 attempts"));
    assert!(records[0].contains("store fallback failed"));
}

struct PanickingJob;

#[async_trait]
impl ScheduledJob for PanickingJob {
    type Output = ();

    fn name(&self) -> &'static str {
        "panicking"
    }

    fn title(&self) -> &'static str {
        "Panicking"
    }

    fn subject(&self) -> &'static str {
        "nothing"
    }

    async fn remote(&self, _ctx: &JobContext<'_>) -> Result<(), RemoteError> {
        panic!("boom")
    }

    async fn fallback(&self, _ctx: &JobContext<'_>) -> Result<(), StoreError> {
        Ok(())
    }

    fn render(&self, _ctx: &JobContext<'_>, _output: &(), _source: DataSource) -> String {
        String::new()
    }

    fn summary(&self, _output: &(), _source: DataSource) -> String {
        String::new()
    }
}

#[tokio::test]
async fn test_panic_is_caught_and_logged() {
    let ctx = TestContext::new().await;
    let (logs, log, errors) = memory_logs();

    let result = ctx.runner.run(&PanickingJob, &logs).await;

    assert!(!result.success);
    assert_eq!(result.message, "Unexpected error: boom");
    assert_eq!(errors.records().len(), 1);
    assert!(errors.contents().contains("Panicking failed unexpectedly: boom"));
    assert_eq!(log.records().len(), 1);
}

#[tokio::test]
async fn test_sink_failure_is_diverted_to_error_log() {
    let store = Arc::new(MemoryStore::new());
    insert_product(store.as_ref(), "Mouse", "19.99", 2).await.unwrap();
    let runner = TestContext::unreachable(store.clone());
    let errors = MemorySink::new();
    let logs = JobLogs::new(Arc::new(MemorySink::failing()), Arc::new(errors.clone()));

    let result = runner.run(&LowStockJob::default(), &logs).await;

    assert!(!result.success);
    assert!(result.message.starts_with("Low stock update failed: "), "{}", result.message);
    assert_eq!(errors.records().len(), 1);
    // The store work itself already happened
    assert_eq!(store.list_products().await.unwrap()[0].stock, 12);
}

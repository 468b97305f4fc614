// Job Runner - Remote first, store fallback, one log record per invocation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crm_shared::{DataSource, JobRunResult};

use super::retry::{RetryError, RetryPolicy};
use super::sink::JobLogs;
use crate::remote::{RemoteClient, RemoteError};
use crate::store::{CrmStore, StoreError};

/// Everything a job may touch during one invocation. `now` is captured once
/// at the start and every window is derived from it.
pub struct JobContext<'a> {
    pub now: DateTime<Utc>,
    pub client: &'a RemoteClient,
    pub store: &'a dyn CrmStore,
}

/// A maintenance job expressed as a remote operation plus its store fallback.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    type Output: Send + Sync;

    /// Identifier used by the scheduler and the admin API.
    fn name(&self) -> &'static str;

    /// Human-facing name used in status strings.
    fn title(&self) -> &'static str;

    /// Keyword for schema diagnostics when no request shape matches.
    fn subject(&self) -> &'static str;

    fn stamp(&self, now: DateTime<Utc>) -> String {
        now.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    async fn remote(&self, ctx: &JobContext<'_>) -> Result<Self::Output, RemoteError>;

    async fn fallback(&self, ctx: &JobContext<'_>) -> Result<Self::Output, StoreError>;

    /// Why a remote answer cannot be used, if it cannot. Rejected answers
    /// are treated like remote failures.
    fn unusable_reason(&self, _output: &Self::Output) -> Option<String> {
        None
    }

    /// The log record for a successful run.
    fn render(&self, ctx: &JobContext<'_>, output: &Self::Output, source: DataSource) -> String;

    /// The status string returned to the scheduler.
    fn summary(&self, output: &Self::Output, source: DataSource) -> String;

    fn payload(&self, _output: &Self::Output) -> Option<Value> {
        None
    }

    /// The log record when both paths failed.
    fn render_failure(&self, ctx: &JobContext<'_>, remote: &str, fallback: &StoreError) -> String {
        format!(
            "{} {} failed: {}; store fallback failed: {}",
            self.stamp(ctx.now),
            self.title(),
            remote,
            fallback
        )
    }
}

/// A record ready to be written plus the result to hand back.
pub struct Settled {
    pub record: String,
    pub result: JobRunResult,
}

#[derive(Clone)]
pub struct JobRunner {
    client: RemoteClient,
    store: Arc<dyn CrmStore>,
    retry: RetryPolicy,
}

impl JobRunner {
    pub fn new(client: RemoteClient, store: Arc<dyn CrmStore>, retry: RetryPolicy) -> Self {
        Self { client, store, retry }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn CrmStore> {
        &self.store
    }

    pub async fn run<J: ScheduledJob>(&self, job: &J, logs: &JobLogs) -> JobRunResult {
        self.run_at(job, logs, Utc::now()).await
    }

    pub async fn run_at<J: ScheduledJob>(&self, job: &J, logs: &JobLogs, now: DateTime<Utc>) -> JobRunResult {
        settle(job.name(), job.title(), now, job.stamp(now), logs, self.resolve(job, now)).await
    }

    async fn resolve<J: ScheduledJob>(&self, job: &J, now: DateTime<Utc>) -> Settled {
        let ctx = JobContext {
            now,
            client: &self.client,
            store: self.store.as_ref(),
        };

        let remote = self.retry.run(|_| job.remote(&ctx)).await;
        let remote_failure = match remote {
            Ok(output) => match job.unusable_reason(&output) {
                None => {
                    info!(job = job.name(), "Remote data retrieved");
                    return self.settled(job, &ctx, output, DataSource::Remote);
                }
                Some(reason) => reason,
            },
            Err(RetryError::Failed(e @ RemoteError::AllCandidatesFailed(_))) => {
                self.diagnose(job).await;
                e.to_string()
            }
            Err(e) => e.to_string(),
        };

        warn!(job = job.name(), "Remote path failed ({}), using store fallback", remote_failure);

        match job.fallback(&ctx).await {
            Ok(output) => self.settled(job, &ctx, output, DataSource::Fallback),
            Err(e) => {
                error!(job = job.name(), "Store fallback failed: {}", e);
                Settled {
                    record: job.render_failure(&ctx, &remote_failure, &e),
                    result: JobRunResult::failure(
                        job.name(),
                        now,
                        format!("{} failed: {}; store fallback failed: {}", job.title(), remote_failure, e),
                    ),
                }
            }
        }
    }

    fn settled<J: ScheduledJob>(&self, job: &J, ctx: &JobContext<'_>, output: J::Output, source: DataSource) -> Settled {
        let mut result = JobRunResult::success(job.name(), ctx.now, source, job.summary(&output, source));
        if let Some(payload) = job.payload(&output) {
            result = result.with_payload(payload);
        }
        Settled {
            record: job.render(ctx, &output, source),
            result,
        }
    }

    async fn diagnose<J: ScheduledJob>(&self, job: &J) {
        if self.client.contract().await.is_some() {
            return;
        }
        match self.client.describe_types(job.subject()).await {
            Ok(types) => warn!(job = job.name(), "Available {} types: {:?}", job.subject(), types),
            Err(e) => warn!(job = job.name(), "Schema introspection failed: {}", e),
        }
    }
}

/// Drives `work` to completion and writes its record exactly once. Panics
/// and sink failures end up in the error log; nothing escapes to the caller.
pub async fn settle<F>(
    name: &'static str,
    title: &'static str,
    now: DateTime<Utc>,
    stamp: String,
    logs: &JobLogs,
    work: F,
) -> JobRunResult
where
    F: Future<Output = Settled> + Send,
{
    let settled = match AssertUnwindSafe(work).catch_unwind().await {
        Ok(settled) => settled,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(job = name, "Job panicked: {}", reason);
            let line = format!("{} {} failed unexpectedly: {}", stamp, title, reason);
            if let Err(e) = logs.errors.append(&line).await {
                error!(job = name, "Failed to write error log: {}", e);
            }
            Settled {
                record: line,
                result: JobRunResult::failure(name, now, format!("Unexpected error: {}", reason)),
            }
        }
    };

    match logs.log.append(&settled.record).await {
        Ok(()) => settled.result,
        Err(e) => {
            error!(job = name, "Failed to write job log: {}", e);
            let line = format!("{} {} failed: {}", stamp, title, e);
            if let Err(e) = logs.errors.append(&line).await {
                error!(job = name, "Failed to write error log: {}", e);
            }
            JobRunResult::failure(name, now, format!("{} failed: {}", title, e))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

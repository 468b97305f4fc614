// Job Scheduler - Central scheduler for all CRM maintenance jobs

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info, warn};
use uuid::Uuid;

use crm_shared::{DataSource, JobRunResult};

use super::runner::JobRunner;
use super::sink::JobLogs;
use super::{
    crm_report, customer_cleanup, heartbeat, low_stock, order_reminders, CrmReportJob, CustomerCleanupJob,
    HeartbeatJob, LowStockJob, OrderRemindersJob, RetryPolicy,
};
use crate::config::LogPaths;

const EXECUTION_HISTORY: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Unknown job: {0}")]
    UnknownJob(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    // Schedules, cron with seconds
    pub heartbeat_schedule: String,
    pub low_stock_schedule: String,
    pub report_schedule: String,
    pub reminders_schedule: String,
    pub cleanup_schedule: String,

    // Remote access
    pub retry: RetryPolicy,

    // Low stock
    pub low_stock_threshold: i32,
    pub restock_increment: i32,

    // Report
    pub report_recent_orders: i64,

    // Reminders and cleanup windows
    pub reminder_window_days: i64,
    pub inactivity_days: i64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            // Heartbeat - every 5 minutes
            heartbeat_schedule: "0 */5 * * * *".to_string(),
            // Low stock - every 12 hours
            low_stock_schedule: "0 0 */12 * * *".to_string(),
            // Report - Mondays at 6 AM
            report_schedule: "0 0 6 * * Mon".to_string(),
            // Reminders - daily at 8 AM
            reminders_schedule: "0 0 8 * * *".to_string(),
            // Cleanup - Sundays at 2 AM
            cleanup_schedule: "0 0 2 * * Sun".to_string(),

            retry: RetryPolicy::default(),

            low_stock_threshold: low_stock::LOW_STOCK_THRESHOLD,
            restock_increment: low_stock::RESTOCK_INCREMENT,
            report_recent_orders: crate::remote::queries::RECENT_ORDER_LIMIT,
            reminder_window_days: order_reminders::REMINDER_WINDOW_DAYS,
            inactivity_days: customer_cleanup::INACTIVITY_DAYS,
        }
    }
}

impl JobConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            heartbeat_schedule: env::var("CRM_HEARTBEAT_SCHEDULE").unwrap_or(defaults.heartbeat_schedule),
            low_stock_schedule: env::var("CRM_LOW_STOCK_SCHEDULE").unwrap_or(defaults.low_stock_schedule),
            report_schedule: env::var("CRM_REPORT_SCHEDULE").unwrap_or(defaults.report_schedule),
            reminders_schedule: env::var("CRM_REMINDERS_SCHEDULE").unwrap_or(defaults.reminders_schedule),
            cleanup_schedule: env::var("CRM_CLEANUP_SCHEDULE").unwrap_or(defaults.cleanup_schedule),
            retry: RetryPolicy {
                max_attempts: env_parse("CRM_RETRY_ATTEMPTS").unwrap_or(defaults.retry.max_attempts),
                base_delay: env_parse("CRM_RETRY_BASE_DELAY_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.retry.base_delay),
            },
            low_stock_threshold: env_parse("CRM_LOW_STOCK_THRESHOLD").unwrap_or(defaults.low_stock_threshold),
            restock_increment: env_parse("CRM_RESTOCK_INCREMENT").unwrap_or(defaults.restock_increment),
            report_recent_orders: env_parse("CRM_REPORT_RECENT_ORDERS").unwrap_or(defaults.report_recent_orders),
            reminder_window_days: env_parse("CRM_REMINDER_WINDOW_DAYS").unwrap_or(defaults.reminder_window_days),
            inactivity_days: env_parse("CRM_INACTIVITY_DAYS").unwrap_or(defaults.inactivity_days),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: JobStatus,
    pub source: DataSource,
    pub message: String,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Every job the scheduler knows about, in registration order.
pub const JOB_NAMES: [&str; 5] = [
    heartbeat::NAME,
    low_stock::NAME,
    crm_report::NAME,
    order_reminders::NAME,
    customer_cleanup::NAME,
];

/// Builds and runs jobs by name. Shared by the cron scheduler, the CLI and
/// the admin API, so every invocation lands in the same execution history.
#[derive(Clone)]
pub struct JobRegistry {
    runner: JobRunner,
    config: JobConfig,
    logs: HashMap<&'static str, JobLogs>,
    execution_logs: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl JobRegistry {
    pub fn new(runner: JobRunner, config: JobConfig, paths: &LogPaths) -> Self {
        let logs = HashMap::from([
            (heartbeat::NAME, JobLogs::files(paths.heartbeat())),
            (low_stock::NAME, JobLogs::files(paths.low_stock())),
            (crm_report::NAME, JobLogs::files(paths.report())),
            (order_reminders::NAME, JobLogs::files(paths.reminders())),
            (customer_cleanup::NAME, JobLogs::files(paths.cleanup())),
        ]);

        Self {
            runner,
            config,
            logs,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Redirects one job's records, e.g. to in-memory sinks.
    pub fn with_logs(mut self, name: &'static str, logs: JobLogs) -> Self {
        self.logs.insert(name, logs);
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub async fn run_job_now(&self, job_name: &str) -> JobResult<JobRunResult> {
        self.run_job_at(job_name, Utc::now()).await
    }

    pub async fn run_job_at(&self, job_name: &str, now: DateTime<Utc>) -> JobResult<JobRunResult> {
        let (name, logs) = self
            .logs
            .get_key_value(job_name)
            .map(|(name, logs)| (*name, logs))
            .ok_or_else(|| JobError::UnknownJob(job_name.to_string()))?;

        info!("Running {} job", name);
        let started_at = Utc::now();
        let config = &self.config;

        let result = match name {
            heartbeat::NAME => HeartbeatJob::new(self.runner.client().clone()).run_at(logs, now).await,
            low_stock::NAME => {
                let job = LowStockJob::new(config.low_stock_threshold, config.restock_increment);
                self.runner.run_at(&job, logs, now).await
            }
            crm_report::NAME => {
                let job = CrmReportJob::new(config.report_recent_orders);
                self.runner.run_at(&job, logs, now).await
            }
            order_reminders::NAME => {
                let job = OrderRemindersJob::new(ChronoDuration::days(config.reminder_window_days));
                self.runner.run_at(&job, logs, now).await
            }
            customer_cleanup::NAME => {
                CustomerCleanupJob::new(self.runner.store().clone())
                    .with_inactivity_days(config.inactivity_days)
                    .run_at(logs, now)
                    .await
            }
            other => return Err(JobError::UnknownJob(other.to_string())),
        };

        if result.success {
            info!("{} job completed: {}", name, result.message);
        } else {
            warn!("{} job failed: {}", name, result.message);
        }

        self.record(name, started_at, &result).await;
        Ok(result)
    }

    async fn record(&self, name: &str, started_at: DateTime<Utc>, result: &JobRunResult) {
        let completed_at = Utc::now();
        let log = JobExecutionLog {
            id: Uuid::new_v4(),
            job_name: name.to_string(),
            started_at,
            completed_at,
            status: if result.success { JobStatus::Completed } else { JobStatus::Failed },
            source: result.source,
            message: result.message.clone(),
            duration_ms: (completed_at - started_at).num_milliseconds(),
        };

        let mut logs = self.execution_logs.write().await;
        logs.push(log);
        // Keep only the most recent runs
        if logs.len() > EXECUTION_HISTORY {
            let excess = logs.len() - EXECUTION_HISTORY;
            logs.drain(..excess);
        }
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    registry: JobRegistry,
}

impl JobScheduler {
    pub async fn new(registry: JobRegistry) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;
        Ok(Self { scheduler, registry })
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting CRM job scheduler");

        let config = self.registry.config().clone();
        self.schedule(heartbeat::NAME, &config.heartbeat_schedule).await?;
        self.schedule(low_stock::NAME, &config.low_stock_schedule).await?;
        self.schedule(crm_report::NAME, &config.report_schedule).await?;
        self.schedule(order_reminders::NAME, &config.reminders_schedule).await?;
        self.schedule(customer_cleanup::NAME, &config.cleanup_schedule).await?;

        self.scheduler.start().await?;

        info!("CRM job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down CRM job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule(&self, name: &'static str, cron_expr: &str) -> JobResult<()> {
        let registry = self.registry.clone();

        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let registry = registry.clone();

            Box::pin(async move {
                if let Err(e) = registry.run_job_now(name).await {
                    error!("Scheduled {} job could not run: {}", name, e);
                }
            })
        })
        .map_err(|e| JobError::ConfigError(format!("invalid schedule '{}' for {}: {}", cron_expr, name, e)))?;

        self.scheduler.add(job).await?;
        info!("Scheduled {} job with '{}'", name, cron_expr);

        Ok(())
    }
}

// Background Jobs Service
//
// Scheduled maintenance jobs for the CRM. Each job asks the GraphQL endpoint
// first, degrades to the store when the endpoint cannot help, and appends
// exactly one record per run to its log.

pub mod crm_report;
pub mod customer_cleanup;
pub mod heartbeat;
pub mod low_stock;
pub mod order_reminders;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod sink;

pub use crm_report::CrmReportJob;
pub use customer_cleanup::CustomerCleanupJob;
pub use heartbeat::HeartbeatJob;
pub use low_stock::LowStockJob;
pub use order_reminders::OrderRemindersJob;
pub use retry::{RetryError, RetryPolicy};
pub use runner::{JobContext, JobRunner, ScheduledJob};
pub use scheduler::{JobConfig, JobError, JobRegistry, JobResult, JobScheduler, JOB_NAMES};
pub use sink::{FileSink, JobLogs, LogSink, MemorySink, SinkError};

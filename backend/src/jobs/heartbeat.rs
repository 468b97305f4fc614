// Heartbeat Job - Confirms the CRM process is alive and probes the GraphQL endpoint

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crm_shared::{DataSource, JobRunResult};

use super::runner::{settle, Settled};
use super::sink::JobLogs;
use crate::remote::RemoteClient;

pub const NAME: &str = "heartbeat";

#[derive(Debug, Clone)]
pub struct HeartbeatJob {
    client: RemoteClient,
}

impl HeartbeatJob {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    pub fn stamp(now: DateTime<Utc>) -> String {
        now.format("%d/%m/%Y-%H:%M:%S").to_string()
    }

    pub async fn run(&self, logs: &JobLogs) -> JobRunResult {
        self.run_at(logs, Utc::now()).await
    }

    pub async fn run_at(&self, logs: &JobLogs, now: DateTime<Utc>) -> JobRunResult {
        let stamp = Self::stamp(now);
        settle(NAME, "Heartbeat", now, stamp.clone(), logs, self.beat(now, stamp)).await
    }

    async fn beat(&self, now: DateTime<Utc>, stamp: String) -> Settled {
        let alive = format!("{} CRM is alive", stamp);
        info!("{}", alive);

        // The probe is informational only; the heartbeat succeeds either way
        let responsive = self.client.probe().await;
        debug!(responsive, "GraphQL reachability probe finished");
        let probe_line = if responsive {
            format!("{} GraphQL endpoint is responsive", stamp)
        } else {
            format!("{} GraphQL endpoint check failed", stamp)
        };

        let source = if responsive { DataSource::Remote } else { DataSource::None };
        Settled {
            record: format!("{}\n{}", alive, probe_line),
            result: JobRunResult::success(NAME, now, source, format!("Heartbeat logged: {}", alive))
                .with_payload(serde_json::json!({ "endpoint_responsive": responsive })),
        }
    }
}

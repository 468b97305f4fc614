// Retry Policy - Exponential backoff for connectivity failures

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::remote::RemoteError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wait before the first retry; doubled for every retry after that
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Failed to reach GraphQL server after {attempts} attempts: {last_error}")]
    Unreachable {
        attempts: u32,
        waits: Vec<Duration>,
        last_error: String,
    },
    #[error(transparent)]
    Failed(RemoteError),
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        self.base_delay.saturating_mul(2u32.saturating_pow(retry - 1))
    }

    /// Runs `op` until it succeeds, fails for a reason other than
    /// connectivity, or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut waits = Vec::new();
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_connectivity() => return Err(RetryError::Failed(e)),
                Err(e) if attempt >= max_attempts => {
                    return Err(RetryError::Unreachable {
                        attempts: attempt,
                        waits,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Connection failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    waits.push(delay);
                    attempt += 1;
                }
            }
        }
    }
}

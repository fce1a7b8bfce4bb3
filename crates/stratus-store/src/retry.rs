//! Bounded retry with exponential backoff for remote calls.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::remote::BlobError;

/// How often and how patiently remote calls are retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The backoff doubles after every failure and
/// is capped at `max_backoff`.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, BlobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BlobError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    let mut backoff = policy.initial_backoff();

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                tracing::warn!(
                    op = what,
                    attempt,
                    max_attempts = attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "retrying remote call"
                );
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, policy.max_backoff());
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

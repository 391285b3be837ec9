//! Startup retries with exponential backoff and jitter
//!
//! The reconcile loop leaves retries to the dispatcher. Startup steps that
//! run before the dispatcher exists (building the client, installing the
//! CRD) retry here instead. Errors that [`crate::Error::is_retryable`] rejects are
//! returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::Result;

/// How often and how patiently to retry a startup step
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Attempts before giving up (0 retries forever)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with a fixed attempt budget
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from `initial_delay` up
    /// to `max_delay`, without jitter
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `step` until it succeeds, fails with a non-retryable error, or the
/// attempt budget runs out.
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, step: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !err.is_retryable() {
            error!(step, error = %err, "startup step failed permanently");
            return Err(err);
        }
        if policy.max_attempts > 0 && attempt >= policy.max_attempts {
            error!(step, attempt, error = %err, "startup step failed after max attempts");
            return Err(err);
        }

        // 0.5x to 1.5x so replicas restarting together spread out
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let delay = policy.delay_after(attempt).mul_f64(jitter);
        warn!(
            step,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "startup step failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

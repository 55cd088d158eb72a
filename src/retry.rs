//! Bounded exponential-backoff retry for remote calls.
//!
//! ## Retry Strategy
//!
//! Rate-limit responses are transient and frequent when a batch hammers one
//! API key. The governor sleeps `base_delay * growth^(attempt-1)` between
//! attempts — with the 3 s base and 1.5× growth the wait sequence is
//! 3 s → 4.5 s — and gives up after `max_attempts` invocations. Every other
//! remote failure propagates immediately: retrying a bad credential or a
//! malformed request only burns quota.
//!
//! Exhaustion is not an error here. The governor returns `Ok(None)` so the
//! caller treats it exactly like a missing remote response and fails the
//! current document without unwinding the batch.

use crate::config::BatchConfig;
use crate::error::RemoteError;
use crate::progress::RunLogger;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Wraps remote calls with the batch's retry policy.
pub struct RetryGovernor {
    max_attempts: u32,
    base_delay: Duration,
    growth: f64,
    log: RunLogger,
}

impl RetryGovernor {
    pub fn new(config: &BatchConfig, log: RunLogger) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay,
            growth: config.backoff_growth,
            log,
        }
    }

    /// Run `op` until it succeeds, fails fatally, or the attempt budget is
    /// spent.
    ///
    /// * `Ok(Some(value))` — the operation completed.
    /// * `Ok(None)` — every attempt was rate-limited; the caller must treat
    ///   this as "operation did not complete".
    /// * `Err(e)` — a non-retryable failure, propagated after exactly one
    ///   attempt at it.
    ///
    /// `label` names the operation in log lines ("upload page_0001.jpg").
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> Result<Option<T>, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut delay = self.base_delay;

        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => {
                    debug!("{label}: succeeded on attempt {attempt}");
                    return Ok(Some(value));
                }
                Err(RemoteError::RateLimited { reason }) => {
                    if attempt == self.max_attempts {
                        debug!("{label}: rate-limited on final attempt: {reason}");
                        break;
                    }
                    self.log.warn(&format!(
                        "Rate limit hit. Retrying in {:.1}s... (Attempt {}/{})",
                        delay.as_secs_f64(),
                        attempt,
                        self.max_attempts
                    ));
                    sleep(delay).await;
                    delay = delay.mul_f64(self.growth);
                }
                Err(e) => {
                    self.log.warn(&format!("[ERROR] {label}: {e}"));
                    return Err(e);
                }
            }
        }

        self.log
            .warn("Max retries exceeded for rate limiting. Aborting.");
        Ok(None)
    }
}

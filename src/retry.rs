//! Bounded exponential backoff with jitter
//!
//! Shared by the sink write path and the processor's fetch/put calls. Jitter
//! spreads retries out so many failing callers do not hammer a recovering
//! backend in lockstep.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Backoff policy for retried operations
///
/// All fields are policy, not contract: hosts tune them through
/// configuration.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor between retries
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction (0.1 = ±10%)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Compute the delay after the given zero-based attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt.min(31) as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        let jittered = if self.jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            (capped * (1.0 + spread)).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered)
    }
}

/// Run `op` until it succeeds, the error is not retryable, or the attempt
/// budget is spent. The final error is returned unchanged so callers can
/// classify it.
pub async fn retry_with_backoff<T, E, Op, Fut, P>(
    config: &BackoffConfig,
    operation: &str,
    mut op: Op,
    is_retryable: P,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let budget = config.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= budget || !is_retryable(&err) {
                    return Err(err);
                }
                let delay = config.delay_for(attempt - 1);
                debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

//! Bounded retry with exponential backoff for eventually consistent calls.
//!
//! Provider state is eventually consistent: a VPC that was just created may
//! not be describable, and tagging it may fail with a not-found code for a
//! few seconds. [`wait_for_with_retryable`] retries a condition only while it
//! fails with one of the codes the caller names as transient; every other
//! error aborts immediately.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::{NetworkError, Result};

/// Backoff settings for one retried operation
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
            backoff_multiplier: 1.5,
        }
    }
}

impl RetryConfig {
    /// Millisecond scale backoff, for tests
    pub fn fast(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }
}

/// Run `condition` until it reports done, fails with a non-retryable error,
/// or the attempt budget runs out.
///
/// `condition` returns `Ok(true)` when done and `Ok(false)` when it should be
/// polled again. Errors whose provider code is listed in `retryable` are
/// retried; exhaustion returns [`NetworkError::RetriesExhausted`] carrying the
/// last error and `resource`.
pub async fn wait_for_with_retryable<F, Fut>(
    config: &RetryConfig,
    resource: &str,
    retryable: &[&str],
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let last = match condition().await {
            Ok(true) => return Ok(()),
            Ok(false) => NetworkError::WaitTimeout(resource.to_string()),
            Err(e) if e.code().is_some_and(|code| retryable.contains(&code)) => e,
            Err(e) => return Err(e),
        };

        if attempt >= max_attempts {
            error!(
                resource = %resource,
                attempt = attempt,
                error = %last,
                "Operation failed after max retries"
            );
            return Err(NetworkError::RetriesExhausted {
                resource: resource.to_string(),
                attempts: attempt,
                source: Box::new(last),
            });
        }

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        warn!(
            resource = %resource,
            attempt = attempt,
            error = %last,
            delay_ms = jittered_delay.as_millis(),
            "Operation not yet successful, retrying"
        );

        tokio::time::sleep(jittered_delay).await;

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}

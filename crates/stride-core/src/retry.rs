//! Retry policy for remote writes.
//!
//! Remote writes are fire-and-forget: a failed write is logged and dropped.
//! A [`RetryConfig`] with `max_retries > 0` first re-sends the document a
//! bounded number of times, doubling the wait each time. Upsert-if-greater
//! makes a repeated write harmless, so every remote or storage failure is
//! worth another attempt; bad input and permission problems are not.
//!
//! # Example
//!
//! ```
//! use stride_core::{Error, RetryConfig, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::new(3);
//!
//! let result = with_retry(&config, "remote upsert", || async {
//!     Ok::<_, Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// How often, and how patiently, to re-send a failed remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Extra attempts after the first one. Zero disables retries.
    pub max_retries: u32,
    /// Wait before the first retry; doubled for each later one.
    pub initial_delay: Duration,
    /// Upper bound on any single wait.
    pub max_delay: Duration,
    /// Add up to a quarter of the wait at random, so writers that failed
    /// together do not retry together.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Up to `max_retries` extra attempts with the default timings.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(0)
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Wait before retry number `retry` (0-based).
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let wait = self.initial_delay.saturating_mul(factor).min(self.max_delay);
        if !self.jitter {
            return wait;
        }

        let spread = u64::try_from(wait.as_millis() / 4).unwrap_or(u64::MAX);
        wait + Duration::from_millis(rand::rng().random_range(0..=spread))
    }
}

/// Run `write` until it succeeds, fails permanently, or runs out of retries.
///
/// `label` names the write in log lines.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, label: &str, write: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        match write().await {
            Ok(value) => {
                if retry > 0 {
                    debug!("{} went through on retry {}", label, retry);
                }
                return Ok(value);
            }
            Err(e) if retry < config.max_retries && is_transient(&e) => {
                let wait = config.backoff(retry);
                retry += 1;
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    label, e, retry, config.max_retries, wait
                );
                sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Whether a failed write could succeed if sent again.
fn is_transient(error: &Error) -> bool {
    matches!(
        error,
        Error::Remote(_) | Error::Io(_) | Error::Store(_) | Error::Sensor(_)
    )
}

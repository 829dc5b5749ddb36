//! Rate-limit backoff.
//!
//! The upstream says exactly how long to wait, so there is no exponential
//! schedule here: the controller sleeps for the signalled duration and the
//! caller retries. A missing or zero duration falls back to `min_wait`.
//!
//! Retry policy:
//! - a rate-limited persist is retried once; a second failure is an error
//! - a rate-limited batch fetch is retried at the same cursor until it
//!   succeeds or fails with something other than a rate limit

use std::time::Duration;
use tracing::warn;

/// Default wait when the rate-limit signal carries no usable duration.
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct BackoffController {
    min_wait: Duration,
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_WAIT)
    }
}

impl BackoffController {
    pub fn new(min_wait: Duration) -> Self {
        Self { min_wait }
    }

    /// The wait applied for a given signal.
    pub fn wait_for(&self, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(d) if !d.is_zero() => d,
            _ => self.min_wait,
        }
    }

    /// Sleep out a rate-limit signal. Returns the time waited.
    pub async fn await_retry(&self, retry_after: Option<Duration>, what: &str) -> Duration {
        let wait = self.wait_for(retry_after);
        warn!(
            operation = what,
            wait_ms = wait.as_millis() as u64,
            "rate limited, sleeping before retry"
        );
        tokio::time::sleep(wait).await;
        wait
    }
}

//! Retry policy for the remote identification backend.

use std::time::Duration;

/// How many times, and how patiently, failed requests are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
    pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);

    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// `base * 2^attempt` plus half a base of jitter headroom, capped at
    /// `backoff_max`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter = (self.backoff_base / 2).min(Duration::from_millis(500));
        exponential.saturating_add(jitter).min(self.backoff_max)
    }

    /// Delay before retrying a rate-limited request. A server-provided
    /// `Retry-After` wins, but never beyond `backoff_max`.
    pub fn rate_limit_delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => Duration::from_secs(secs).min(self.backoff_max),
            None => self.backoff(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            backoff_base: Self::DEFAULT_BACKOFF_BASE,
            backoff_max: Self::DEFAULT_BACKOFF_MAX,
        }
    }
}

/// Whether a transport-level failure is worth retrying.
///
/// Connection failures, timeouts and interrupted bodies are; anything that
/// reached the server and came back with a definite answer is not.
pub fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_body()
}

/// Gateway and availability statuses that usually clear up on their own.
pub fn is_transient_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 502..=504)
}

/// Parse the `Retry-After` header in its integer-seconds form.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

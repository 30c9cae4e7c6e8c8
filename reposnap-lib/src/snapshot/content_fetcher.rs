//! Fetching raw file contents with retry and backoff.

use super::throttler::Throttler;
use super::transport::{ApiResult, RawResponse, Transport, classify};
use super::{ContentLocator, ErrorKind, SnapshotError, TreeEntry};
use bytes::Bytes;
use chrono::Utc;
use core::time::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const LOG_TARGET: &str = "   content";

/// How hard to try before giving up on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per file, including the first.
    pub max_attempts: u32,
    /// Delay used when the provider throttles without saying for how long.
    pub default_retry_after: Duration,
    /// Upper bound on any provider-requested delay.
    pub max_rate_limit_wait: Duration,
    /// First backoff after a transient failure; doubles on each further attempt.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Bound on a single request, independent of any backoff.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            default_retry_after: Duration::from_secs(5),
            max_rate_limit_wait: Duration::from_secs(60),
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following failed attempt number `attempt` (zero-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Delay to honor after a rate-limit response.
    #[must_use]
    pub fn rate_limit_wait(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or(self.default_retry_after).min(self.max_rate_limit_wait)
    }
}

/// What one attempt told us.
enum Attempt {
    Done(RawResponse),
    RetryAfter(Duration, ErrorKind, String),
    GiveUp(ErrorKind, String),
}

/// Retrieves the raw bytes of single files.
///
/// Holds no mutable state, so one instance serves any number of concurrent callers.
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl ContentFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch the contents of a file entry.
    pub async fn fetch_content(&self, entry: &TreeEntry, cancel: &CancellationToken) -> Result<Bytes, SnapshotError> {
        self.fetch_gated(entry, cancel, None).await
    }

    /// Like [`fetch_content`](Self::fetch_content), but pauses `throttler` whenever the
    /// provider asks us to slow down so other workers hold off too.
    pub async fn fetch_gated(
        &self,
        entry: &TreeEntry,
        cancel: &CancellationToken,
        throttler: Option<&Arc<Throttler>>,
    ) -> Result<Bytes, SnapshotError> {
        let Some(locator) = &entry.locator else {
            return Err(SnapshotError::FetchExhausted {
                last_reason: ErrorKind::InvalidReference,
                attempts: 0,
                detail: format!("'{}' is not a file", entry.path),
            });
        };

        self.fetch_with_retry(locator, cancel, throttler).await.map(|resp| resp.body)
    }

    /// Fetch whatever a locator points at, keeping the response headers.
    pub async fn fetch_locator(&self, locator: &ContentLocator, cancel: &CancellationToken) -> Result<RawResponse, SnapshotError> {
        self.fetch_with_retry(locator, cancel, None).await
    }

    async fn fetch_with_retry(
        &self,
        locator: &ContentLocator,
        cancel: &CancellationToken,
        throttler: Option<&Arc<Throttler>>,
    ) -> Result<RawResponse, SnapshotError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SnapshotError::Cancelled),
                outcome = self.attempt(locator, attempt) => outcome,
            };
            attempt += 1;

            let (delay, last_reason, detail) = match outcome {
                Attempt::Done(resp) => return Ok(resp),
                Attempt::GiveUp(last_reason, detail) => {
                    log::debug!(target: LOG_TARGET, "Not retrying {locator}: {detail}");
                    return Err(SnapshotError::FetchExhausted {
                        last_reason,
                        attempts: attempt,
                        detail,
                    });
                }
                Attempt::RetryAfter(delay, last_reason, detail) => (delay, last_reason, detail),
            };

            if attempt >= max_attempts {
                log::warn!(target: LOG_TARGET, "Giving up on {locator} after {attempt} attempt(s): {detail}");
                return Err(SnapshotError::FetchExhausted {
                    last_reason,
                    attempts: attempt,
                    detail,
                });
            }

            if last_reason == ErrorKind::RateLimited
                && let Some(throttler) = throttler
                && throttler.pause_for(delay)
            {
                log::info!(target: LOG_TARGET, "Provider rate limit hit, pausing dispatch for {}ms", delay.as_millis());
            }

            log::debug!(
                target: LOG_TARGET,
                "Retrying {locator} (attempt {}, delay {}ms): {detail}",
                attempt + 1,
                delay.as_millis()
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SnapshotError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&self, locator: &ContentLocator, attempt: u32) -> Attempt {
        let request = self.transport.get(locator.url());

        let resp = match tokio::time::timeout(self.policy.request_timeout, request).await {
            Err(_) => {
                return Attempt::RetryAfter(
                    self.policy.backoff(attempt),
                    ErrorKind::NetworkTransient,
                    format!("request timed out after {}ms", self.policy.request_timeout.as_millis()),
                );
            }
            Ok(Err(failure)) => {
                return Attempt::RetryAfter(self.policy.backoff(attempt), ErrorKind::NetworkTransient, failure.detail);
            }
            Ok(Ok(resp)) => resp,
        };

        match classify(resp, Utc::now()) {
            ApiResult::Success(resp) => Attempt::Done(resp),
            ApiResult::RateLimited(requested) => {
                let wait = self.policy.rate_limit_wait(requested);
                Attempt::RetryAfter(wait, ErrorKind::RateLimited, "rate limited by provider".to_string())
            }
            ApiResult::NotFound => Attempt::GiveUp(ErrorKind::RepositoryNotFound, "HTTP 404 Not Found".to_string()),
            ApiResult::Rejected(status) => Attempt::GiveUp(ErrorKind::UpstreamError, format!("HTTP {status}")),
            ApiResult::Failed(status) => {
                Attempt::RetryAfter(self.policy.backoff(attempt), ErrorKind::UpstreamError, format!("HTTP {status}"))
            }
        }
    }
}

//! HTTP transport abstraction and response classification
//!
//! The engine never talks to `reqwest` directly. It goes through [`Transport`] so the
//! fetchers can run against an in-memory double in tests, and it reads every response
//! through [`classify`] so rate limits, missing resources, and permanent rejections are
//! recognized the same way for tree listings and file contents.

use crate::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core::fmt::Debug;
use core::time::Duration;
use futures::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use url::Url;

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// The request never produced a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub detail: String,
}

impl TransportFailure {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}

/// Issues GET requests against the hosting provider.
pub trait Transport: Send + Sync + Debug {
    fn get<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawResponse, TransportFailure>>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .build()?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawResponse, TransportFailure>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| TransportFailure::new(format!("GET {url}: {e}")))?;

            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp
                .bytes()
                .await
                .map_err(|e| TransportFailure::new(format!("reading body of {url}: {e}")))?;

            Ok(RawResponse { status, headers, body })
        })
    }
}

/// Outcome of a provider call after looking at its status and headers.
#[derive(Debug)]
pub enum ApiResult {
    /// 2xx.
    Success(RawResponse),

    /// Throttled; carries the provider-requested delay when it gave one.
    RateLimited(Option<Duration>),

    /// 404.
    NotFound,

    /// Any other 4xx; retrying will not help.
    Rejected(StatusCode),

    /// 5xx or an unexpected status; a later attempt may succeed.
    Failed(StatusCode),
}

/// Classify a response, reading rate-limit information relative to `now`.
#[must_use]
pub fn classify(resp: RawResponse, now: DateTime<Utc>) -> ApiResult {
    let status = resp.status;

    if status.is_success() {
        return ApiResult::Success(resp);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return ApiResult::RateLimited(rate_limit_delay(&resp.headers, now));
    }

    // Secondary rate limits come back as 403 with either Retry-After or an exhausted quota.
    if status == StatusCode::FORBIDDEN && is_rate_limit_signal(&resp.headers) {
        return ApiResult::RateLimited(rate_limit_delay(&resp.headers, now));
    }

    if status == StatusCode::NOT_FOUND {
        return ApiResult::NotFound;
    }

    if status.is_client_error() {
        return ApiResult::Rejected(status);
    }

    ApiResult::Failed(status)
}

/// Parse the `Retry-After` header value as seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    let s = headers.get(RETRY_AFTER).and_then(|h| h.to_str().ok())?;
    s.trim().parse::<u64>().ok()
}

fn parse_remaining(headers: &HeaderMap) -> Option<u64> {
    headers.get("x-ratelimit-remaining")?.to_str().ok()?.parse::<u64>().ok()
}

fn parse_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse::<i64>().ok()?;
    DateTime::from_timestamp(reset_timestamp, 0)
}

fn is_rate_limit_signal(headers: &HeaderMap) -> bool {
    parse_retry_after(headers).is_some() || parse_remaining(headers) == Some(0)
}

/// Delay requested by the provider, from `Retry-After` or the quota reset time.
fn rate_limit_delay(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(secs) = parse_retry_after(headers) {
        return Some(Duration::from_secs(secs));
    }

    if parse_remaining(headers) == Some(0) {
        let reset_at = parse_reset(headers)?;
        return Some((reset_at - now).to_std().unwrap_or(Duration::ZERO));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response(status: u16, headers: &[(&'static str, &'static str)]) -> RawResponse {
        let mut resp = RawResponse::new(StatusCode::from_u16(status).unwrap(), Bytes::new());
        for (name, value) in headers {
            let _ = resp.headers.insert(*name, HeaderValue::from_static(value));
        }
        resp
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_067_000, 0).unwrap()
    }

    #[test]
    fn test_success() {
        assert!(matches!(classify(response(200, &[]), now()), ApiResult::Success(_)));
    }

    #[test]
    fn test_too_many_requests_with_retry_after() {
        let result = classify(response(429, &[("retry-after", "7")]), now());
        assert!(matches!(result, ApiResult::RateLimited(Some(d)) if d == Duration::from_secs(7)));
    }

    #[test]
    fn test_too_many_requests_without_hint() {
        assert!(matches!(classify(response(429, &[]), now()), ApiResult::RateLimited(None)));
    }

    #[test]
    fn test_forbidden_with_exhausted_quota_uses_reset_time() {
        let result = classify(
            response(403, &[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "1704067200")]),
            now(),
        );
        assert!(matches!(result, ApiResult::RateLimited(Some(d)) if d == Duration::from_secs(200)));
    }

    #[test]
    fn test_reset_time_in_the_past_means_no_wait() {
        let result = classify(
            response(403, &[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", "1704066000")]),
            now(),
        );
        assert!(matches!(result, ApiResult::RateLimited(Some(Duration::ZERO))));
    }

    #[test]
    fn test_plain_forbidden_is_rejected() {
        let result = classify(response(403, &[("x-ratelimit-remaining", "42")]), now());
        assert!(matches!(result, ApiResult::Rejected(StatusCode::FORBIDDEN)));
    }

    #[test]
    fn test_not_found() {
        assert!(matches!(classify(response(404, &[]), now()), ApiResult::NotFound));
    }

    #[test]
    fn test_other_client_error_is_rejected() {
        assert!(matches!(classify(response(410, &[]), now()), ApiResult::Rejected(StatusCode::GONE)));
    }

    #[test]
    fn test_server_error_is_failed() {
        assert!(matches!(
            classify(response(502, &[]), now()),
            ApiResult::Failed(StatusCode::BAD_GATEWAY)
        ));
    }

    #[test]
    fn test_invalid_retry_after_is_ignored() {
        assert!(matches!(
            classify(response(429, &[("retry-after", "soon")]), now()),
            ApiResult::RateLimited(None)
        ));
    }

    #[test]
    fn test_content_type() {
        let resp = response(200, &[("content-type", "text/plain; charset=utf-8")]);
        assert_eq!(resp.content_type(), Some("text/plain; charset=utf-8"));
        assert_eq!(response(200, &[]).content_type(), None);
    }

    #[test]
    fn test_http_transport_builds() {
        let _ = HttpTransport::new("reposnap-test", Duration::from_secs(5)).unwrap();
    }
}

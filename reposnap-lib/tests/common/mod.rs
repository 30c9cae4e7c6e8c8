//! In-memory provider used by the integration tests.
//!
//! Responses are scripted per URL. Each URL plays its script in order and then keeps
//! repeating the last step. The transport records every call and the highest number of
//! calls that were ever outstanding at once.

#![allow(dead_code, reason = "each test binary uses a different subset of the helpers")]

use bytes::Bytes;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use futures::future::BoxFuture;
use reposnap_lib::snapshot::{ContentLocator, RawResponse, Transport, TransportFailure, TreeEntry};
use reqwest::StatusCode;
use reqwest::header::{HeaderName, HeaderValue};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;

pub const RAW_BASE: &str = "https://raw.test";

#[derive(Debug, Clone)]
pub enum Step {
    Respond {
        status: StatusCode,
        headers: Vec<(&'static str, String)>,
        body: Bytes,
        delay: Duration,
    },
    Fail {
        detail: &'static str,
        delay: Duration,
    },
}

impl Step {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::Respond {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Respond {
            status: StatusCode::from_u16(status).unwrap(),
            headers: Vec::new(),
            body: Bytes::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn rate_limited(retry_after: Option<u64>) -> Self {
        let headers = retry_after.map(|secs| vec![("retry-after", secs.to_string())]).unwrap_or_default();
        Self::Respond {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers,
            body: Bytes::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn fail(detail: &'static str) -> Self {
        Self::Fail {
            detail,
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn after(self, wait: Duration) -> Self {
        match self {
            Self::Respond { status, headers, body, .. } => Self::Respond {
                status,
                headers,
                body,
                delay: wait,
            },
            Self::Fail { detail, .. } => Self::Fail { detail, delay: wait },
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn script(self, url: &str, steps: Vec<Step>) -> Self {
        assert!(!steps.is_empty(), "a script needs at least one step");
        let _ = self.scripts.lock().unwrap().insert(url.to_string(), steps);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.as_str() == url).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, url: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(steps) if steps.len() > 1 => steps.remove(0),
            Some(steps) => steps[0].clone(),
            None => Step::status(404),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Transport for ScriptedTransport {
    fn get<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawResponse, TransportFailure>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(url.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            match self.next_step(url.as_str()) {
                Step::Respond {
                    status,
                    headers,
                    body,
                    delay,
                } => {
                    tokio::time::sleep(delay).await;
                    let mut resp = RawResponse::new(status, body);
                    for (name, value) in headers {
                        let _ = resp
                            .headers
                            .insert(HeaderName::from_static(name), HeaderValue::from_str(&value).unwrap());
                    }
                    Ok(resp)
                }
                Step::Fail { detail, delay } => {
                    tokio::time::sleep(delay).await;
                    Err(TransportFailure::new(detail))
                }
            }
        })
    }
}

/// Raw-content URL of `path` in the test repository.
pub fn raw_url(path: &str) -> String {
    format!("{RAW_BASE}/o/r/HEAD/{path}")
}

pub fn file_entry(path: &str) -> TreeEntry {
    TreeEntry::file(path, 0, ContentLocator::new(Url::parse(&raw_url(path)).unwrap()))
}

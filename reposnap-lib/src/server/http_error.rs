use crate::snapshot::{ErrorKind, SnapshotError};
use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

const LOG_TARGET: &str = "      http";

/// An engine error on its way to becoming a JSON error response.
#[derive(Debug)]
pub struct ApiError(SnapshotError);

impl From<SnapshotError> for ApiError {
    fn from(e: SnapshotError) -> Self {
        Self(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(SnapshotError::InvalidReference(rejection.body_text()))
    }
}

impl ApiError {
    #[must_use]
    pub const fn error(&self) -> &SnapshotError {
        &self.0
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            SnapshotError::InvalidReference(_) => StatusCode::BAD_REQUEST,
            SnapshotError::RepositoryNotFound(_) => StatusCode::NOT_FOUND,
            SnapshotError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            SnapshotError::NetworkTransient(_) | SnapshotError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            SnapshotError::FetchExhausted { last_reason, .. } => match last_reason {
                ErrorKind::InvalidReference => StatusCode::BAD_REQUEST,
                ErrorKind::RepositoryNotFound => StatusCode::NOT_FOUND,
                ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            SnapshotError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            SnapshotError::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::warn!(target: LOG_TARGET, "Request failed with {status}: {}", self.0);
        } else {
            log::debug!(target: LOG_TARGET, "Request rejected with {status}: {}", self.0);
        }

        let body = serde_json::json!({
            "error": self.0.kind(),
            "detail": self.0.to_string(),
        });

        let mut response = (status, Json(body)).into_response();

        if let SnapshotError::RateLimited { retry_after: Some(delay) } = &self.0 {
            let _ = response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(delay.as_secs().max(1)));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn test_listing_errors_map_to_statuses() {
        let cases = [
            (SnapshotError::InvalidReference("x".into()), StatusCode::BAD_REQUEST),
            (SnapshotError::RepositoryNotFound("o/r@HEAD".into()), StatusCode::NOT_FOUND),
            (SnapshotError::RateLimited { retry_after: None }, StatusCode::TOO_MANY_REQUESTS),
            (SnapshotError::UpstreamError("HTTP 500".into()), StatusCode::BAD_GATEWAY),
            (SnapshotError::NetworkTransient("reset".into()), StatusCode::BAD_GATEWAY),
            (SnapshotError::TimedOut, StatusCode::GATEWAY_TIMEOUT),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn test_exhausted_fetch_maps_by_last_reason() {
        let missing = SnapshotError::FetchExhausted {
            last_reason: ErrorKind::RepositoryNotFound,
            attempts: 1,
            detail: "HTTP 404 Not Found".into(),
        };
        assert_eq!(ApiError::from(missing).status(), StatusCode::NOT_FOUND);

        let flaky = SnapshotError::FetchExhausted {
            last_reason: ErrorKind::NetworkTransient,
            attempts: 3,
            detail: "connection reset".into(),
        };
        assert_eq!(ApiError::from(flaky).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError::from(SnapshotError::RateLimited {
            retry_after: Some(Duration::from_secs(42)),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "42");
    }
}

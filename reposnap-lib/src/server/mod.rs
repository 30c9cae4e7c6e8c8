//! HTTP surface of the snapshot engine
//!
//! Four GET endpoints, all stateless apart from the shared [`Snapshotter`]:
//!
//! - `/api/files?repo_url=...` lists a snapshot's tree.
//! - `/api/download?url=...` proxies one raw file.
//! - `/api/download_all?repo_url=...` streams the whole snapshot as a zip archive.
//! - `/` answers liveness probes.
//!
//! Errors are reported as `{"error": <kind>, "detail": <message>}`.

mod handlers;
mod http_error;

use crate::Result;
use crate::snapshot::Snapshotter;
use axum::Router;
use axum::http::Method;
use axum::http::header::{CONTENT_DISPOSITION, HeaderName};
use axum::routing::get;
use core::future::Future;
use ohno::IntoAppError;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::SNAPSHOT_TOTAL_HEADER;
pub use http_error::ApiError;

const LOG_TARGET: &str = "    server";

/// State shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Snapshotter,
    /// Cancelled when the server shuts down; every job runs under it.
    pub shutdown: CancellationToken,
}

impl AppState {
    #[must_use]
    pub fn new(engine: Snapshotter) -> Self {
        Self {
            engine,
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .expose_headers([CONTENT_DISPOSITION, HeaderName::from_static(SNAPSHOT_TOTAL_HEADER)]);

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/files", get(handlers::files))
        .route("/api/download", get(handlers::download))
        .route("/api/download_all", get(handlers::download_all))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Serve requests on `listener` until `shutdown` resolves.
///
/// When it does, running snapshot jobs are cancelled so their connections wind down.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().into_app_err("reading listener address")?;
    log::info!(target: LOG_TARGET, "Listening on http://{addr}");

    let jobs = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            log::info!(target: LOG_TARGET, "Shutting down");
            jobs.cancel();
        })
        .await
        .into_app_err("serving HTTP requests")
}

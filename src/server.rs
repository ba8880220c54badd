//! HTTP trigger endpoint.
//!
//! `GET|POST /sync` runs one sync inside the request and reports the
//! outcome; `GET /healthz` is a liveness probe. Query parameters are parsed
//! leniently: anything malformed falls back to its default.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{RawQuery, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::config::parse_duration;
use crate::error::{Error, Result};
use crate::model::{format_instant, SyncWindow};
use crate::schedule::Shutdown;
use crate::window;
use crate::TogglDW;

pub fn router(dw: TogglDW) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sync", get(trigger_sync).post(trigger_sync))
        .layer(middleware::from_fn(log_requests))
        .with_state(dw)
}

/// Serve the trigger endpoint until shutdown is signalled.
pub async fn serve(addr: SocketAddr, dw: TogglDW, mut shutdown: Shutdown) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("cannot listen on {addr}: {e}")))?;
    log::info!("trigger endpoint listening on http://{addr}");

    axum::serve(listener, router(dw))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            log::info!("trigger endpoint shutting down");
        })
        .await
        .map_err(|e| Error::Other(format!("trigger endpoint failed: {e}")))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Default, PartialEq)]
struct SyncParams {
    from: String,
    to: String,
    timeout: Option<Duration>,
}

impl SyncParams {
    /// First occurrence of each key wins; unknown keys are ignored.
    fn parse(query: &str) -> Self {
        let mut from = None;
        let mut to = None;
        let mut timeout = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "from" if from.is_none() => from = Some(value.into_owned()),
                "to" if to.is_none() => to = Some(value.into_owned()),
                "timeout" if timeout.is_none() => timeout = Some(value.into_owned()),
                _ => {}
            }
        }

        let timeout = timeout.and_then(|raw| match parse_duration(&raw) {
            Ok(d) if !d.is_zero() => Some(d),
            Ok(_) => None,
            Err(e) => {
                log::debug!("ignoring timeout: {e}");
                None
            }
        });

        Self {
            from: from.unwrap_or_default(),
            to: to.unwrap_or_default(),
            timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    from: String,
    to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    projects: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<usize>,
}

impl SyncResponse {
    fn failed(status: &'static str, window: &SyncWindow, err: &Error) -> Self {
        Self {
            status,
            error: Some(err.to_string()),
            from: format_instant(&window.from),
            to: format_instant(&window.to),
            projects: None,
            entries: None,
        }
    }
}

async fn trigger_sync(
    State(dw): State<TogglDW>,
    RawQuery(query): RawQuery,
) -> (StatusCode, Json<SyncResponse>) {
    let params = SyncParams::parse(query.as_deref().unwrap_or_default());
    let window = window::resolve_lenient(&params.from, &params.to, Utc::now());
    log::info!("sync requested window={window} timeout={:?}", params.timeout);

    match dw.run_with_timeout(window, params.timeout).await {
        Ok(report) => (
            StatusCode::OK,
            Json(SyncResponse {
                status: "ok",
                error: None,
                from: format_instant(&report.window.from),
                to: format_instant(&report.window.to),
                projects: Some(report.projects_synced),
                entries: Some(report.entries_synced),
            }),
        ),
        Err(e) if e.is_conflict() => (
            StatusCode::CONFLICT,
            Json(SyncResponse::failed("conflict", &window, &e)),
        ),
        Err(e) => {
            log::error!("triggered sync failed window={window}: {e}");
            let code = match e {
                Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (code, Json(SyncResponse::failed("error", &window, &e)))
        }
    }
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let resp = next.run(req).await;
    log::info!(
        "{method} {path} status={} elapsed={:?}",
        resp.status().as_u16(),
        started.elapsed()
    );
    resp
}

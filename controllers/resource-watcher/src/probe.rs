//! HTTP probe endpoints.
//!
//! - `GET /livez`: the process is up
//! - `GET /healthz`: 200 once the synchronizer is watching, 503 otherwise
//! - `GET /metrics`: steady-state delivery failure counters, Prometheus text format

use crate::synchronizer::Synchronizer;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug, Serialize)]
struct HealthBody {
    healthy: bool,
}

async fn livez() -> StatusCode {
    StatusCode::OK
}

async fn healthz(State(sync): State<Arc<Synchronizer>>) -> (StatusCode, Json<HealthBody>) {
    let healthy = sync.is_healthy();
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(HealthBody { healthy }))
}

async fn metrics(State(sync): State<Arc<Synchronizer>>) -> Response {
    match sync.diagnostics().encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [(CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Probe routes backed by `sync`.
pub fn router(sync: Arc<Synchronizer>) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(sync)
}

/// Serve the probe routes on `addr` until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    sync: Arc<Synchronizer>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Probe server listening");
    axum::serve(listener, router(sync))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostics, NOTIFY_FAILURES_METRIC, WatchNotifyError};
    use crate::error::SyncError;
    use crate::test_utils::{MockAdapter, eventually};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use collector_client::{ChangeKind, CollectorError, MockEventSender, ResourceKind};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn synchronizer(adapter: Arc<MockAdapter>) -> Arc<Synchronizer> {
        Arc::new(Synchronizer::new(
            adapter,
            Arc::new(MockEventSender::new()),
            "probe-test",
            Duration::from_secs(5),
            Arc::new(Diagnostics::new().unwrap()),
        ))
    }

    async fn request(router: Router, path: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, bytes.to_vec())
    }

    async fn get_json(router: Router, path: &str) -> (StatusCode, Value) {
        let (status, _, bytes) = request(router, path).await;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_livez_always_ok() {
        let sync = synchronizer(Arc::new(MockAdapter::new()));
        let (status, _) = get_json(router(sync), "/livez").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_healthz_unavailable_before_watching() {
        let sync = synchronizer(Arc::new(MockAdapter::new()));
        let (status, body) = get_json(router(sync), "/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["healthy"], false);
    }

    #[tokio::test]
    async fn test_healthz_ok_while_watching() {
        let adapter = Arc::new(MockAdapter::new());
        let sync = synchronizer(Arc::clone(&adapter));
        let shutdown = CancellationToken::new();
        let run = {
            let sync = Arc::clone(&sync);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { sync.run(shutdown).await })
        };
        eventually("healthy", || sync.is_healthy()).await;

        let (status, body) = get_json(router(Arc::clone(&sync)), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);

        shutdown.cancel();
        assert!(matches!(run.await.unwrap(), SyncError::Cancelled));
        let (status, _) = get_json(router(sync), "/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_exposes_failure_counters() {
        let sync = synchronizer(Arc::new(MockAdapter::new()));
        sync.diagnostics().report(&WatchNotifyError {
            kind: ResourceKind::ConfigMap,
            change: ChangeKind::Add,
            source: CollectorError::Rejected {
                status: 502,
                body: String::new(),
            },
        });

        let (status, content_type, body) = request(router(sync), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/plain; version=0.0.4"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(&format!("{NOTIFY_FAILURES_METRIC}{{resource_type=\"configmap\"}} 1")));
        assert!(text.contains(&format!("{NOTIFY_FAILURES_METRIC}{{resource_type=\"pod\"}} 0")));
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let sync = synchronizer(Arc::new(MockAdapter::new()));
        let (status, _) = get_json(router(sync), "/readyz").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

//! Liveness, readiness and metrics endpoints
//!
//! - `GET /healthz` answers as long as the process serves HTTP
//! - `GET /readyz` answers 200 once the controller is running, 503 before
//! - `GET /metrics` renders [`ReconcileMetrics`] as Prometheus text

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::metrics::ReconcileMetrics;
use crate::{Error, Result};

/// Shared state behind the probe endpoints
#[derive(Clone, Default)]
pub struct ProbeState {
    ready: Arc<AtomicBool>,
    metrics: Arc<ReconcileMetrics>,
}

impl ProbeState {
    /// Create probe state reporting the given metrics
    pub fn new(metrics: Arc<ReconcileMetrics>) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    /// Flip the readiness probe
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Current readiness
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Build the probe router
pub fn router(state: ProbeState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn readyz_handler(State(state): State<ProbeState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics_handler(State(state): State<ProbeState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Serve the probe endpoints until `shutdown` fires
pub async fn serve(addr: SocketAddr, state: ProbeState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::config(format!("failed to bind probe address {addr}: {e}")))?;
    info!(%addr, "probe server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::internal(format!("probe server failed: {e}")))
}

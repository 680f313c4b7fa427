//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for container
//! health checks and monitoring. Readiness depends on the store
//! having been restored and the persistence directory being writable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Whether the store was restored and the A2A endpoint is bound.
    pub serving: Arc<AtomicBool>,
    /// Whether snapshots and the ledger journal can be written.
    pub persistence_healthy: Arc<AtomicBool>,
    /// Whether the price feed has fresh ticks (informational).
    pub feeds_healthy: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state: not serving yet, dependencies healthy.
    pub fn new() -> Self {
        Self {
            serving: Arc::new(AtomicBool::new(false)),
            persistence_healthy: Arc::new(AtomicBool::new(true)),
            feeds_healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Check if the exchange is ready to serve traffic.
    ///
    /// Feed health is reported but does not gate readiness; perp trades
    /// fail individually when a price is unavailable.
    pub fn is_ready(&self) -> bool {
        self.serving.load(Ordering::Relaxed) && self.persistence_healthy.load(Ordering::Relaxed)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Axum-based health check HTTP server.
///
/// Serves liveness (/live) and readiness (/ready) endpoints for
/// container health checks and orchestrator probes.
pub struct HealthServer {
    /// Health state shared with all components.
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Start the health check server in the background.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: returns 200 only once serving with healthy persistence.
    async fn readiness(
        State(state): State<Arc<HealthState>>,
    ) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

//! Prometheus Metrics Registry - Exchange Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers RPC throughput and latency, trade counts and volume,
//! authentication failures, subscriptions and feed health.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Centralized Prometheus metrics for the exchange.
///
/// All metrics follow the naming convention `a2a_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// RPC requests by method and outcome (ok / error code name).
    pub rpc_requests: IntCounterVec,
    /// RPC handling latency in seconds, by method.
    pub rpc_latency: HistogramVec,
    /// Committed trades by kind.
    pub trades: IntCounterVec,
    /// Traded notional by kind.
    pub trade_volume: CounterVec,
    /// Authentication failures by reason.
    pub auth_failures: IntCounterVec,
    /// Active market subscriptions.
    pub subscriptions: IntGauge,
    /// Feed connection status (1 = connected, 0 = disconnected).
    pub feed_connected: GaugeVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let rpc_requests = IntCounterVec::new(
            Opts::new("a2a_rpc_requests_total", "Total A2A RPC requests"),
            &["method", "outcome"],
        )?;

        let rpc_latency = HistogramVec::new(
            HistogramOpts::new("a2a_rpc_latency_seconds", "A2A RPC handling latency")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["method"],
        )?;

        let trades = IntCounterVec::new(
            Opts::new("a2a_trades_total", "Total committed trades"),
            &["kind"],
        )?;

        let trade_volume = CounterVec::new(
            Opts::new("a2a_trade_volume_usd", "Traded notional in balance units"),
            &["kind"],
        )?;

        let auth_failures = IntCounterVec::new(
            Opts::new("a2a_auth_failures_total", "Rejected credentials"),
            &["reason"],
        )?;

        let subscriptions = IntGauge::new(
            "a2a_market_subscriptions",
            "Active agent market subscriptions",
        )?;

        let feed_connected = GaugeVec::new(
            Opts::new(
                "a2a_feed_connected",
                "Feed connection status (1=connected, 0=disconnected)",
            ),
            &["source"],
        )?;

        registry.register(Box::new(rpc_requests.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;
        registry.register(Box::new(trades.clone()))?;
        registry.register(Box::new(trade_volume.clone()))?;
        registry.register(Box::new(auth_failures.clone()))?;
        registry.register(Box::new(subscriptions.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;

        Ok(Self {
            registry,
            rpc_requests,
            rpc_latency,
            trades,
            trade_volume,
            auth_failures,
            subscriptions,
            feed_connected,
        })
    }

    /// Record one handled RPC.
    pub fn observe_rpc(&self, method: &str, outcome: &str, seconds: f64) {
        self.rpc_requests.with_label_values(&[method, outcome]).inc();
        self.rpc_latency.with_label_values(&[method]).observe(seconds);
    }

    /// Record one committed trade of `notional` size.
    pub fn observe_trade(&self, kind: &str, notional: f64) {
        self.trades.with_label_values(&[kind]).inc();
        if notional.is_finite() && notional > 0.0 {
            self.trade_volume.with_label_values(&[kind]).inc_by(notional);
        }
    }

    /// Record a rejected credential.
    pub fn observe_auth_failure(&self, reason: &str) {
        self.auth_failures.with_label_values(&[reason]).inc();
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics = Arc::clone(&self);
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics);
                async move { metrics.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_observed_metrics() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.observe_rpc("a2a.getBalance", "ok", 0.002);
        metrics.observe_trade("pred_buy", 50.0);
        metrics.observe_auth_failure("expired_signature");
        let text = metrics.render();
        assert!(text.contains("a2a_rpc_requests_total"));
        assert!(text.contains("a2a_trade_volume_usd"));
        assert!(text.contains("expired_signature"));
    }
}

//! Binance WebSocket Feed - Live Perp Reference Prices
//!
//! Connects to Binance's aggregate trade stream for every configured
//! feed symbol and writes each trade price into the shared `PriceBook`.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use super::price_book::PriceBook;
use crate::adapters::metrics::MetricsRegistry;

/// Binance WebSocket aggregate trade message.
#[derive(Debug, Deserialize)]
struct AggTradeMsg {
    /// Symbol.
    s: String,
    /// Price as string.
    p: String,
    /// Trade time (Unix ms).
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Binance real-time price feed via WebSocket.
pub struct BinanceFeed {
    book: Arc<PriceBook>,
    ws_url: String,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl BinanceFeed {
    /// Build a feed streaming every symbol the book maps to a ticker.
    ///
    /// Returns `None` when no ticker has a feed symbol.
    pub fn new(book: Arc<PriceBook>, base_url: &str, metrics: Option<Arc<MetricsRegistry>>) -> Option<Self> {
        let ws_url = stream_url(base_url, &book.feed_symbols())?;
        Some(Self {
            book,
            ws_url,
            metrics,
        })
    }

    /// Run the WebSocket connection loop until shutdown.
    ///
    /// Reconnects after 5 seconds on any disconnect.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(url = %self.ws_url, "Connecting to Binance WebSocket");

        loop {
            match self.connect_and_stream(&mut shutdown_rx).await {
                Ok(()) => {
                    info!("Binance feed shut down gracefully");
                    return Ok(());
                }
                Err(e) => {
                    self.set_connected(false);
                    warn!(error = %e, "Binance WebSocket disconnected, reconnecting in 5s");
                    tokio::select! {
                        _ = shutdown_rx.recv() => return Ok(()),
                        _ = tokio::time::sleep(tokio::time::Duration::from_secs(5)) => {}
                    }
                }
            }
        }
    }

    async fn connect_and_stream(&self, shutdown_rx: &mut broadcast::Receiver<()>) -> Result<()> {
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .context("Binance WebSocket connection failed")?;

        let (_write, mut read) = ws_stream.split();

        info!("Binance WebSocket connected");
        self.set_connected(true);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received in Binance feed");
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_message(&text).await {
                                debug!(error = %e, "Failed to parse Binance message");
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(anyhow::anyhow!("WebSocket stream ended"));
                        }
                        Some(Err(e)) => {
                            return Err(anyhow::anyhow!("WebSocket error: {e}"));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_message(&self, text: &str) -> Result<()> {
        let msg: AggTradeMsg = serde_json::from_str(text).context("Invalid aggTrade JSON")?;
        let price = Decimal::from_str(&msg.p).context("Invalid price")?;
        let at = Utc
            .timestamp_millis_opt(msg.trade_time)
            .single()
            .unwrap_or_else(Utc::now);

        if !self.book.apply_tick(&msg.s, price, at).await {
            debug!(symbol = %msg.s, "Tick for unmapped symbol");
        }
        Ok(())
    }

    fn set_connected(&self, connected: bool) {
        if let Some(metrics) = &self.metrics {
            metrics
                .feed_connected
                .with_label_values(&["binance"])
                .set(if connected { 1.0 } else { 0.0 });
        }
    }
}

/// Combined aggTrade stream URL for `symbols`, e.g.
/// `wss://.../ws/btcusdt@aggTrade/ethusdt@aggTrade`.
fn stream_url(base_url: &str, symbols: &[String]) -> Option<String> {
    if symbols.is_empty() {
        return None;
    }
    let streams: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}@aggTrade", s.to_lowercase()))
        .collect();
    Some(format!("{}/{}", base_url.trim_end_matches('/'), streams.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerpMarketConfig;
    use crate::ports::price_feed::PriceFeed;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stream_url_joins_symbols() {
        let url = stream_url(
            "wss://stream.binance.com:9443/ws/",
            &["btcusdt".into(), "ETHUSDT".into()],
        );
        assert_eq!(
            url.as_deref(),
            Some("wss://stream.binance.com:9443/ws/btcusdt@aggTrade/ethusdt@aggTrade")
        );
        assert!(stream_url("wss://x", &[]).is_none());
    }

    #[tokio::test]
    async fn test_agg_trade_updates_book() {
        let book = Arc::new(PriceBook::from_config(
            &[PerpMarketConfig {
                ticker: "BTC".into(),
                name: String::new(),
                feed_symbol: Some("btcusdt".into()),
                reference_price: dec!(50000),
                max_leverage: 100,
            }],
            30,
        ));
        let feed = BinanceFeed::new(Arc::clone(&book), "wss://example", None).unwrap();
        feed.handle_message(r#"{"e":"aggTrade","s":"BTCUSDT","p":"50123.45","q":"0.1","T":1700000000000}"#)
            .await
            .unwrap();
        assert_eq!(book.price("BTC").await.unwrap(), Some(dec!(50123.45)));
        assert!(feed.handle_message("not json").await.is_err());
    }
}

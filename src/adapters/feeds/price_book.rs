//! Price Book - Perp Reference Prices
//!
//! Holds the latest price per perp ticker. Seeded from the configured
//! reference prices and overwritten by live exchange ticks when a feed
//! is running. Implements the `PriceFeed` port.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::PerpMarketConfig;
use crate::ports::price_feed::PriceFeed;

/// Latest known price for one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub price: Decimal,
    /// `None` while the configured reference price is in use.
    pub live_at: Option<DateTime<Utc>>,
}

/// In-memory price table keyed by ticker.
pub struct PriceBook {
    quotes: RwLock<HashMap<String, Quote>>,
    /// Exchange symbol (lowercase) -> ticker.
    symbols: HashMap<String, String>,
    stale_after: Duration,
}

impl PriceBook {
    /// Seed the book from perp market configuration.
    pub fn from_config(markets: &[PerpMarketConfig], stale_after_secs: i64) -> Self {
        let quotes = markets
            .iter()
            .map(|m| {
                (
                    m.ticker.to_uppercase(),
                    Quote {
                        price: m.reference_price,
                        live_at: None,
                    },
                )
            })
            .collect();
        let symbols = markets
            .iter()
            .filter_map(|m| {
                m.feed_symbol
                    .as_ref()
                    .map(|s| (s.to_lowercase(), m.ticker.to_uppercase()))
            })
            .collect();

        Self {
            quotes: RwLock::new(quotes),
            symbols,
            stale_after: Duration::seconds(stale_after_secs),
        }
    }

    /// Exchange symbols with a live stream configured.
    pub fn feed_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.symbols.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Set a ticker's price directly.
    pub async fn set_price(&self, ticker: &str, price: Decimal, at: DateTime<Utc>) {
        self.quotes.write().await.insert(
            ticker.to_uppercase(),
            Quote {
                price,
                live_at: Some(at),
            },
        );
    }

    /// Apply an exchange tick. Returns `false` for symbols no ticker maps to.
    pub async fn apply_tick(&self, symbol: &str, price: Decimal, at: DateTime<Utc>) -> bool {
        let Some(ticker) = self.symbols.get(&symbol.to_lowercase()) else {
            return false;
        };
        if price <= Decimal::ZERO {
            debug!(symbol, %price, "Ignoring non-positive tick");
            return false;
        }
        self.set_price(ticker, price, at).await;
        true
    }

    pub async fn quote(&self, ticker: &str) -> Option<Quote> {
        self.quotes.read().await.get(&ticker.to_uppercase()).copied()
    }

    /// Whether every live-fed ticker has ticked within the staleness window.
    pub async fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let quotes = self.quotes.read().await;
        self.symbols.values().all(|ticker| {
            quotes
                .get(ticker)
                .and_then(|q| q.live_at)
                .is_some_and(|at| now - at <= self.stale_after)
        })
    }
}

#[async_trait]
impl PriceFeed for PriceBook {
    async fn price(&self, ticker: &str) -> anyhow::Result<Option<Decimal>> {
        Ok(self.quote(ticker).await.map(|q| q.price))
    }

    async fn is_healthy(&self) -> bool {
        self.is_fresh_at(Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn markets() -> Vec<PerpMarketConfig> {
        vec![
            PerpMarketConfig {
                ticker: "btc".into(),
                name: "Bitcoin".into(),
                feed_symbol: Some("BTCUSDT".into()),
                reference_price: dec!(50000),
                max_leverage: 100,
            },
            PerpMarketConfig {
                ticker: "TSLAI".into(),
                name: "Tesla".into(),
                feed_symbol: None,
                reference_price: dec!(250),
                max_leverage: 20,
            },
        ]
    }

    #[tokio::test]
    async fn test_seeded_prices_are_served() {
        let book = PriceBook::from_config(&markets(), 30);
        assert_eq!(book.price("BTC").await.unwrap(), Some(dec!(50000)));
        assert_eq!(book.price("tslai").await.unwrap(), Some(dec!(250)));
        assert_eq!(book.price("DOGE").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tick_overrides_reference_price() {
        let book = PriceBook::from_config(&markets(), 30);
        let now = Utc::now();
        assert!(book.apply_tick("btcusdt", dec!(51000.5), now).await);
        assert!(!book.apply_tick("ethusdt", dec!(3000), now).await);
        assert_eq!(book.price("BTC").await.unwrap(), Some(dec!(51000.5)));
    }

    #[tokio::test]
    async fn test_freshness_requires_recent_tick() {
        let book = PriceBook::from_config(&markets(), 30);
        let now = Utc::now();
        assert!(!book.is_fresh_at(now).await);
        book.apply_tick("BTCUSDT", dec!(50100), now).await;
        assert!(book.is_fresh_at(now + Duration::seconds(10)).await);
        assert!(!book.is_fresh_at(now + Duration::seconds(31)).await);
    }
}

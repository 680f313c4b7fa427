//! Price Feed Port - Perp Reference Prices
//!
//! The perpetual trading service reads a current reference price for a
//! ticker before opening or closing a position. Implementations may be
//! backed by an exchange WebSocket, a static book, or a mock.

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Source of current reference prices by ticker symbol.
#[async_trait]
pub trait PriceFeed: Send + Sync + 'static {
  /// Current price for `ticker`, or `None` if the ticker is not quoted.
  async fn price(&self, ticker: &str) -> anyhow::Result<Option<Decimal>>;

  /// Check if the feed has fresh data.
  async fn is_healthy(&self) -> bool;
}

//! Perpetual Trading Use Case - Leveraged Open/Close
//!
//! Reads a reference price from the `PriceFeed` port before entering the
//! store transaction, then settles margin and the position atomically.
//! Liquidation prices are computed and exposed; positions that cross
//! them are flagged on read but not force-closed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::error::{TradingError, TradingResult};
use crate::domain::market::TransactionKind;
use crate::domain::perp::{PerpPosition, PerpSide};
use crate::ports::price_feed::PriceFeed;
use crate::store::Store;

use super::ledger::{LedgerEntry, credit_in, debit_in, record_pnl_in};

/// A tradable perp ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerpMarketSpec {
  pub ticker: String,
  pub name: String,
  pub max_leverage: u32,
}

/// Ticker listing with its current price.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerpMarketInfo {
  pub ticker: String,
  pub name: String,
  pub max_leverage: u32,
  pub price: Option<Decimal>,
  /// Sum of open margin times leverage.
  pub open_interest: Decimal,
}

/// A perp position marked to the current price.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerpPositionView {
  #[serde(flatten)]
  pub position: PerpPosition,
  pub breaches_liquidation: bool,
}

/// Result of closing a position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseReceipt {
  pub position: PerpPosition,
  #[serde(rename = "realizedPnL")]
  pub realized_pnl: Decimal,
  /// Margin plus PnL returned to the wallet.
  pub settlement: Decimal,
  pub balance_after: Decimal,
}

/// Orchestrates leveraged positions.
pub struct PerpetualService {
  store: Arc<Store>,
  feed: Arc<dyn PriceFeed>,
  markets: BTreeMap<String, PerpMarketSpec>,
  maintenance_margin_ratio: Decimal,
}

impl PerpetualService {
  /// Create a service for the given tickers.
  pub fn new(
    store: Arc<Store>,
    feed: Arc<dyn PriceFeed>,
    markets: Vec<PerpMarketSpec>,
    maintenance_margin_ratio: Decimal,
  ) -> Self {
    let markets = markets
      .into_iter()
      .map(|mut m| {
        m.ticker = m.ticker.to_ascii_uppercase();
        (m.ticker.clone(), m)
      })
      .collect();
    Self {
      store,
      feed,
      markets,
      maintenance_margin_ratio,
    }
  }

  fn spec(&self, ticker: &str) -> TradingResult<&PerpMarketSpec> {
    self
      .markets
      .get(&ticker.to_ascii_uppercase())
      .ok_or_else(|| TradingError::UnknownTicker(ticker.to_string()))
  }

  async fn reference_price(&self, ticker: &str) -> TradingResult<Decimal> {
    match self.feed.price(ticker).await {
      Ok(Some(price)) if price > Decimal::ZERO => Ok(price),
      Ok(_) => Err(TradingError::PriceUnavailable(ticker.to_string())),
      Err(e) => {
        warn!(ticker, error = %e, "Price feed lookup failed");
        Err(TradingError::PriceUnavailable(ticker.to_string()))
      }
    }
  }

  /// Open a leveraged position, locking `size` as margin.
  #[instrument(skip(self, side, size), fields(side = %side, size = %size))]
  pub async fn open_position(
    &self,
    user_id: &str,
    ticker: &str,
    side: PerpSide,
    size: Decimal,
    leverage: u32,
  ) -> TradingResult<PerpPosition> {
    let spec = self.spec(ticker)?;
    if size <= Decimal::ZERO {
      return Err(TradingError::InvalidInput(format!(
        "size must be positive, got {size}"
      )));
    }
    if leverage == 0 || leverage > spec.max_leverage {
      return Err(TradingError::InvalidInput(format!(
        "leverage must be between 1 and {}, got {leverage}",
        spec.max_leverage
      )));
    }

    let ticker = spec.ticker.clone();
    let entry = self.reference_price(&ticker).await?;
    let mmr = self.maintenance_margin_ratio;
    let user = user_id.to_string();

    let position = self
      .store
      .transaction(move |tx| {
        let now = Utc::now();
        let position = PerpPosition::open(&user, &ticker, side, entry, size, leverage, mmr, now);
        debit_in(
          tx,
          &user,
          size,
          LedgerEntry::new(
            TransactionKind::PerpOpen,
            format!("Open {side} {ticker} {leverage}x"),
          )
          .reference(&position.id),
          now,
        )?;
        tx.put_perp_position(position.clone());
        Ok(position)
      })
      .await?;

    info!(
      user_id,
      position_id = %position.id,
      ticker = %position.ticker,
      entry = %position.entry_price,
      liquidation = %position.liquidation_price,
      "Perp position opened"
    );
    Ok(position)
  }

  /// Close an open position at the current price.
  #[instrument(skip(self))]
  pub async fn close_position(&self, user_id: &str, position_id: &str) -> TradingResult<CloseReceipt> {
    let existing = self
      .store
      .read(|t| t.perp_positions.get(position_id).cloned())
      .await
      .ok_or_else(|| TradingError::PositionNotFound(position_id.to_string()))?;
    if existing.user_id != user_id {
      return Err(TradingError::Forbidden(format!(
        "position {position_id} is not owned by the caller"
      )));
    }
    if !existing.is_open() {
      return Err(TradingError::PositionClosed(position_id.to_string()));
    }

    let price = self.reference_price(&existing.ticker).await?;
    let (user, pid) = (user_id.to_string(), position_id.to_string());

    let receipt = self
      .store
      .transaction(move |tx| {
        let now = Utc::now();
        let mut position = tx
          .perp_position(&pid)
          .ok_or_else(|| TradingError::PositionNotFound(pid.clone()))?;
        if position.user_id != user {
          return Err(TradingError::Forbidden(format!(
            "position {pid} is not owned by the caller"
          )));
        }
        let pnl = position.close(price, now)?;
        let settlement = position.settlement_amount(pnl);

        let balance_after = if settlement > Decimal::ZERO {
          credit_in(
            tx,
            &user,
            settlement,
            LedgerEntry::new(
              TransactionKind::PerpClose,
              format!("Close {} {}", position.side, position.ticker),
            )
            .reference(&position.id),
            now,
          )?
          .balance_after
        } else {
          tx.wallet(&user)
            .map(|w| w.virtual_balance)
            .ok_or_else(|| TradingError::WalletNotFound(user.clone()))?
        };
        record_pnl_in(tx, &user, pnl)?;
        tx.put_perp_position(position.clone());

        Ok(CloseReceipt {
          position,
          realized_pnl: pnl,
          settlement,
          balance_after,
        })
      })
      .await?;

    info!(
      user_id,
      position_id,
      exit = %price,
      pnl = %receipt.realized_pnl,
      "Perp position closed"
    );
    Ok(receipt)
  }

  /// Current prices for a set of tickers; unavailable ones are skipped.
  async fn prices_for(&self, tickers: impl IntoIterator<Item = String>) -> HashMap<String, Decimal> {
    let mut prices = HashMap::new();
    for ticker in tickers {
      if prices.contains_key(&ticker) {
        continue;
      }
      if let Ok(price) = self.reference_price(&ticker).await {
        prices.insert(ticker, price);
      }
    }
    prices
  }

  /// The user's positions, open ones marked to the current price.
  pub async fn positions(&self, user_id: &str, include_closed: bool) -> Vec<PerpPositionView> {
    let positions: Vec<PerpPosition> = self
      .store
      .read(|t| {
        t.perp_positions_for(user_id)
          .filter(|p| include_closed || p.is_open())
          .cloned()
          .collect()
      })
      .await;

    let prices = self
      .prices_for(positions.iter().filter(|p| p.is_open()).map(|p| p.ticker.clone()).collect::<Vec<_>>())
      .await;

    positions
      .into_iter()
      .map(|mut position| {
        let mut breaches_liquidation = false;
        if position.is_open() {
          if let Some(price) = prices.get(&position.ticker) {
            position.mark(*price);
            breaches_liquidation = position.is_breaching(*price);
          }
        }
        PerpPositionView {
          position,
          breaches_liquidation,
        }
      })
      .collect()
  }

  /// Tradable tickers with current prices and open interest.
  pub async fn markets(&self) -> Vec<PerpMarketInfo> {
    let open_interest: HashMap<String, Decimal> = self
      .store
      .read(|t| {
        let mut oi = HashMap::new();
        for p in t.perp_positions.values().filter(|p| p.is_open()) {
          *oi.entry(p.ticker.clone()).or_insert(Decimal::ZERO) += p.size * Decimal::from(p.leverage);
        }
        oi
      })
      .await;
    let prices = self.prices_for(self.markets.values().map(|m| m.ticker.clone()).collect::<Vec<_>>()).await;

    self
      .markets
      .values()
      .map(|m| PerpMarketInfo {
        ticker: m.ticker.clone(),
        name: m.name.clone(),
        max_leverage: m.max_leverage,
        price: prices.get(&m.ticker).copied(),
        open_interest: open_interest.get(&m.ticker).copied().unwrap_or_default(),
      })
      .collect()
  }
}

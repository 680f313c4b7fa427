//! Prediction Trading Use Case - AMM Buy/Sell and Resolution
//!
//! Each trade runs validate -> price -> settle wallet -> settle market ->
//! settle position inside one store transaction. Any failing step
//! aborts the transaction, so a rejected trade leaves the wallet, the
//! market reserves and the position untouched.
//!
//! The cached market snapshot is invalidated after every commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::amm::AmmPricer;
use crate::domain::error::{TradingError, TradingResult};
use crate::domain::fees::MONEY_DP;
use crate::domain::market::{Market, Outcome, Position, TransactionKind};
use crate::store::Store;

use super::cache::TtlCache;
use super::ledger::{LedgerEntry, credit_in, debit_in, record_pnl_in};

/// Result of a successful buy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyReceipt {
  pub market_id: String,
  pub position_id: String,
  pub side: Outcome,
  /// Amount debited, fee included.
  pub amount: Decimal,
  pub fee: Decimal,
  pub net_amount: Decimal,
  pub shares_bought: Decimal,
  pub avg_price: Decimal,
  pub yes_price: Decimal,
  pub no_price: Decimal,
  pub position_shares: Decimal,
  pub position_avg_price: Decimal,
  pub balance_after: Decimal,
}

/// Result of a successful sell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellReceipt {
  pub market_id: String,
  pub position_id: String,
  pub side: Outcome,
  pub shares_sold: Decimal,
  pub gross_proceeds: Decimal,
  pub fee: Decimal,
  pub net_proceeds: Decimal,
  #[serde(rename = "realizedPnL")]
  pub realized_pnl: Decimal,
  pub remaining_shares: Decimal,
  /// Position removed because the remainder was dust.
  pub position_closed: bool,
  pub yes_price: Decimal,
  pub no_price: Decimal,
  pub balance_after: Decimal,
}

/// Result of resolving a market.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionSummary {
  pub market_id: String,
  pub outcome: Outcome,
  pub positions_settled: usize,
  pub winners: usize,
  pub total_payout: Decimal,
}

/// A position with its mark-to-market value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
  #[serde(flatten)]
  pub position: Position,
  pub question: String,
  pub current_price: Decimal,
  pub current_value: Decimal,
  #[serde(rename = "unrealizedPnL")]
  pub unrealized_pnl: Decimal,
}

fn money(value: Decimal) -> Decimal {
  value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointNearestEven)
}

/// Orchestrates prediction-market trades against the store.
pub struct PredictionService {
  store: Arc<Store>,
  pricer: AmmPricer,
  max_trade_amount: Decimal,
  cache: TtlCache<Market>,
}

impl PredictionService {
  /// Create a service pricing with `pricer`.
  pub fn new(
    store: Arc<Store>,
    pricer: AmmPricer,
    max_trade_amount: Decimal,
    cache_ttl_secs: i64,
  ) -> Self {
    Self {
      store,
      pricer,
      max_trade_amount,
      cache: TtlCache::new(cache_ttl_secs),
    }
  }

  /// The AMM used for quotes.
  pub fn pricer(&self) -> &AmmPricer {
    &self.pricer
  }

  /// Buy `amount` worth of `side` shares.
  #[instrument(skip(self, side, amount), fields(side = %side, amount = %amount))]
  pub async fn buy_shares(
    &self,
    user_id: &str,
    market_id: &str,
    side: Outcome,
    amount: Decimal,
  ) -> TradingResult<BuyReceipt> {
    if amount <= Decimal::ZERO {
      return Err(TradingError::InvalidInput(format!(
        "amount must be positive, got {amount}"
      )));
    }
    if amount > self.max_trade_amount {
      return Err(TradingError::InvalidInput(format!(
        "amount {amount} exceeds the maximum trade size {}",
        self.max_trade_amount
      )));
    }

    let pricer = self.pricer;
    let (user, mid) = (user_id.to_string(), market_id.to_string());
    let receipt = self
      .store
      .transaction(move |tx| {
        let now = Utc::now();
        let mut market = tx
          .market(&mid)
          .ok_or_else(|| TradingError::MarketNotFound(mid.clone()))?;
        market.ensure_open(now)?;

        let quote =
          pricer.calculate_buy_with_fees(market.yes_shares, market.no_shares, side, amount)?;

        let row = debit_in(
          tx,
          &user,
          amount,
          LedgerEntry::new(
            TransactionKind::PredBuy,
            format!("Buy {side} shares: {}", market.question),
          )
          .reference(&market.id),
          now,
        )?;

        market.yes_shares = quote.new_yes_reserve;
        market.no_shares = quote.new_no_reserve;
        market.liquidity += quote.net_amount;

        let position = match tx.find_position(&user, &mid, side) {
          Some(mut existing) => {
            existing.add_fill(quote.shares_bought, quote.avg_price, now);
            existing
          }
          None => Position::open(&user, &mid, side, quote.shares_bought, quote.avg_price, now),
        };

        let receipt = BuyReceipt {
          market_id: market.id.clone(),
          position_id: position.id.clone(),
          side,
          amount,
          fee: quote.fee,
          net_amount: quote.net_amount,
          shares_bought: quote.shares_bought,
          avg_price: quote.avg_price,
          yes_price: market.yes_price(),
          no_price: market.no_price(),
          position_shares: position.shares,
          position_avg_price: position.avg_price,
          balance_after: row.balance_after,
        };
        tx.put_market(market);
        tx.put_position(position);
        Ok(receipt)
      })
      .await?;

    self.cache.invalidate(market_id).await;
    info!(
      user_id,
      market_id,
      shares = %receipt.shares_bought,
      yes_price = %receipt.yes_price,
      "Shares bought"
    );
    Ok(receipt)
  }

  /// Sell `shares` from a position owned by `user_id`.
  #[instrument(skip(self, shares), fields(shares = %shares))]
  pub async fn sell_shares(
    &self,
    user_id: &str,
    position_id: &str,
    shares: Decimal,
  ) -> TradingResult<SellReceipt> {
    if shares <= Decimal::ZERO {
      return Err(TradingError::InvalidInput(format!(
        "shares must be positive, got {shares}"
      )));
    }

    let pricer = self.pricer;
    let (user, pid) = (user_id.to_string(), position_id.to_string());
    let receipt = self
      .store
      .transaction(move |tx| {
        let now = Utc::now();
        let mut position = tx
          .position(&pid)
          .ok_or_else(|| TradingError::PositionNotFound(pid.clone()))?;
        if position.user_id != user {
          return Err(TradingError::Forbidden(format!(
            "position {pid} is not owned by the caller"
          )));
        }
        if shares > position.shares {
          return Err(TradingError::InsufficientShares {
            requested: shares,
            held: position.shares,
          });
        }
        let mut market = tx
          .market(&position.market_id)
          .ok_or_else(|| TradingError::MarketNotFound(position.market_id.clone()))?;
        if market.resolved {
          return Err(TradingError::MarketResolved(market.id.clone()));
        }

        let quote = pricer.calculate_sell_with_fees(
          market.yes_shares,
          market.no_shares,
          position.side,
          shares,
        )?;
        if quote.net_proceeds <= Decimal::ZERO {
          return Err(TradingError::InsufficientLiquidity(format!(
            "selling {shares} shares yields no proceeds"
          )));
        }

        let row = credit_in(
          tx,
          &user,
          quote.net_proceeds,
          LedgerEntry::new(
            TransactionKind::PredSell,
            format!("Sell {} shares: {}", position.side, market.question),
          )
          .reference(&market.id),
          now,
        )?;

        market.yes_shares = quote.new_yes_reserve;
        market.no_shares = quote.new_no_reserve;
        market.liquidity = (market.liquidity - quote.total_cost).max(Decimal::ZERO);

        let realized_pnl = money(quote.net_proceeds - position.cost_basis(shares));
        record_pnl_in(tx, &user, realized_pnl)?;

        let closed = position.reduce(shares, now);
        let remaining = if closed { Decimal::ZERO } else { position.shares };
        if closed {
          tx.delete_position(&position.id);
        } else {
          tx.put_position(position.clone());
        }

        let receipt = SellReceipt {
          market_id: market.id.clone(),
          position_id: position.id.clone(),
          side: position.side,
          shares_sold: shares,
          gross_proceeds: quote.total_cost,
          fee: quote.fee,
          net_proceeds: quote.net_proceeds,
          realized_pnl,
          remaining_shares: remaining,
          position_closed: closed,
          yes_price: market.yes_price(),
          no_price: market.no_price(),
          balance_after: row.balance_after,
        };
        tx.put_market(market);
        Ok(receipt)
      })
      .await?;

    self.cache.invalidate(&receipt.market_id).await;
    info!(
      user_id,
      position_id,
      proceeds = %receipt.net_proceeds,
      pnl = %receipt.realized_pnl,
      "Shares sold"
    );
    Ok(receipt)
  }

  /// Create a market seeded with the given reserves.
  #[instrument(skip(self, question))]
  pub async fn create_market(
    &self,
    question: &str,
    end_time: DateTime<Utc>,
    seed_yes: Decimal,
    seed_no: Decimal,
  ) -> TradingResult<Market> {
    let question = question.trim();
    if question.is_empty() {
      return Err(TradingError::InvalidInput("question must not be empty".into()));
    }
    if seed_yes < Decimal::ZERO || seed_no < Decimal::ZERO {
      return Err(TradingError::InvalidInput(
        "seed reserves must be non-negative".into(),
      ));
    }
    if end_time <= Utc::now() {
      return Err(TradingError::InvalidInput("end time must be in the future".into()));
    }

    let market = Market::new(question, end_time, seed_yes, seed_no);
    let stored = market.clone();
    self
      .store
      .transaction(move |tx| {
        tx.put_market(stored);
        Ok(())
      })
      .await?;
    info!(market_id = %market.id, question, "Market created");
    Ok(market)
  }

  /// Resolve a market, paying 1 per winning share and closing every position.
  #[instrument(skip(self))]
  pub async fn resolve_market(
    &self,
    market_id: &str,
    outcome: Outcome,
  ) -> TradingResult<ResolutionSummary> {
    let mid = market_id.to_string();
    let summary = self
      .store
      .transaction(move |tx| {
        let now = Utc::now();
        let mut market = tx
          .market(&mid)
          .ok_or_else(|| TradingError::MarketNotFound(mid.clone()))?;
        if market.resolved {
          return Err(TradingError::MarketResolved(mid.clone()));
        }
        market.resolved = true;
        market.resolution = Some(outcome);

        let positions = tx.positions_for_market(&mid);
        let mut winners = 0;
        let mut total_payout = Decimal::ZERO;
        for position in &positions {
          let cost = position.cost_basis(position.shares);
          let payout = if position.side == outcome {
            money(position.shares)
          } else {
            Decimal::ZERO
          };
          if payout > Decimal::ZERO {
            winners += 1;
            total_payout += payout;
            credit_in(
              tx,
              &position.user_id,
              payout,
              LedgerEntry::new(
                TransactionKind::ResolutionPayout,
                format!("Resolved {outcome}: {}", market.question),
              )
              .reference(&mid),
              now,
            )?;
          }
          record_pnl_in(tx, &position.user_id, money(payout - cost))?;
          tx.delete_position(&position.id);
        }
        tx.put_market(market);

        Ok(ResolutionSummary {
          market_id: mid.clone(),
          outcome,
          positions_settled: positions.len(),
          winners,
          total_payout,
        })
      })
      .await?;

    self.cache.invalidate(market_id).await;
    info!(
      market_id,
      outcome = %outcome,
      settled = summary.positions_settled,
      payout = %summary.total_payout,
      "Market resolved"
    );
    Ok(summary)
  }

  /// All markets, newest first.
  pub async fn markets(&self, include_resolved: bool) -> Vec<Market> {
    self
      .store
      .read(|t| {
        let mut markets: Vec<Market> = t
          .markets
          .values()
          .filter(|m| include_resolved || !m.resolved)
          .cloned()
          .collect();
        markets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        markets
      })
      .await
  }

  /// One market, served from the cache when fresh.
  pub async fn market(&self, market_id: &str) -> TradingResult<Market> {
    if let Some(market) = self.cache.get(market_id).await {
      return Ok(market);
    }
    let generation = self.cache.generation();
    let market = self
      .store
      .read(|t| t.markets.get(market_id).cloned())
      .await
      .ok_or_else(|| TradingError::MarketNotFound(market_id.to_string()))?;
    self.cache.insert_if_current(market_id, market.clone(), generation).await;
    Ok(market)
  }

  /// The user's open positions, marked to current prices.
  pub async fn positions(&self, user_id: &str) -> Vec<PositionView> {
    self
      .store
      .read(|t| {
        t.positions_for(user_id)
          .filter_map(|p| {
            let Some(market) = t.markets.get(&p.market_id) else {
              warn!(position_id = %p.id, market_id = %p.market_id, "Position references a missing market");
              return None;
            };
            let current_price = market.price(p.side);
            let current_value = money(current_price * p.shares);
            Some(PositionView {
              position: p.clone(),
              question: market.question.clone(),
              current_price,
              current_value,
              unrealized_pnl: money(current_value - p.cost_basis(p.shares)),
            })
          })
          .collect()
      })
      .await
  }
}

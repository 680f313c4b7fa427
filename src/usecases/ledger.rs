//! Ledger Use Case - Atomic Balance Mutation and Audit Trail
//!
//! Every balance change goes through `debit_in` / `credit_in`, which
//! mutate the wallet and append exactly one `BalanceTransaction` inside
//! the caller's store transaction. Trading services compose these
//! primitives into larger transactions; `LedgerService` wraps them for
//! standalone use.
//!
//! A new wallet starts at zero and is funded by a `deposit` row, so the
//! balance always equals the sum of the user's ledger rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::domain::error::{TradingError, TradingResult};
use crate::domain::market::{BalanceTransaction, TransactionKind, Wallet, new_id};
use crate::store::{Store, Tx};

/// Descriptive fields attached to a ledger row.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
  pub kind: TransactionKind,
  pub description: String,
  pub reference_id: Option<String>,
}

impl LedgerEntry {
  pub fn new(kind: TransactionKind, description: impl Into<String>) -> Self {
    Self {
      kind,
      description: description.into(),
      reference_id: None,
    }
  }

  /// Attach the id of the market, position or intent behind the change.
  pub fn reference(mut self, id: impl Into<String>) -> Self {
    self.reference_id = Some(id.into());
    self
  }
}

/// Result of comparing a wallet against its ledger rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAudit {
  pub user_id: String,
  pub balance: Decimal,
  pub ledger_sum: Decimal,
  pub rows: usize,
  pub consistent: bool,
}

// ────────────────────────────────────────────
// Transaction-scoped primitives
// ────────────────────────────────────────────

fn require_positive(amount: Decimal) -> TradingResult<()> {
  if amount <= Decimal::ZERO {
    return Err(TradingError::InvalidInput(format!(
      "amount must be positive, got {amount}"
    )));
  }
  Ok(())
}

fn append_row(
  tx: &mut Tx<'_>,
  user_id: &str,
  amount: Decimal,
  before: Decimal,
  after: Decimal,
  entry: LedgerEntry,
  now: DateTime<Utc>,
) -> BalanceTransaction {
  let row = BalanceTransaction {
    id: new_id(),
    user_id: user_id.to_string(),
    amount,
    kind: entry.kind,
    description: entry.description,
    reference_id: entry.reference_id,
    balance_before: before,
    balance_after: after,
    created_at: now,
  };
  tx.append_ledger(row.clone());
  row
}

/// Returns the user's wallet, creating and funding it on first use.
pub fn ensure_wallet_in(
  tx: &mut Tx<'_>,
  user_id: &str,
  initial_balance: Decimal,
  initial_points: i64,
  now: DateTime<Utc>,
) -> TradingResult<Wallet> {
  if let Some(wallet) = tx.wallet(user_id) {
    return Ok(wallet);
  }
  tx.put_wallet(Wallet::empty(user_id, initial_points, now));
  if initial_balance > Decimal::ZERO {
    credit_in(
      tx,
      user_id,
      initial_balance,
      LedgerEntry::new(TransactionKind::Deposit, "Initial balance"),
      now,
    )?;
  }
  tx.wallet(user_id)
    .ok_or_else(|| TradingError::WalletNotFound(user_id.to_string()))
}

/// Decrements the balance; fails without side effects if it would go negative.
pub fn debit_in(
  tx: &mut Tx<'_>,
  user_id: &str,
  amount: Decimal,
  entry: LedgerEntry,
  now: DateTime<Utc>,
) -> TradingResult<BalanceTransaction> {
  require_positive(amount)?;
  let mut wallet = tx
    .wallet(user_id)
    .ok_or_else(|| TradingError::WalletNotFound(user_id.to_string()))?;

  if amount > wallet.virtual_balance {
    return Err(TradingError::InsufficientFunds {
      needed: amount,
      available: wallet.virtual_balance,
    });
  }

  let before = wallet.virtual_balance;
  wallet.virtual_balance -= amount;
  if entry.kind == TransactionKind::Withdrawal {
    wallet.total_withdrawn += amount;
  }
  let after = wallet.virtual_balance;
  tx.put_wallet(wallet);
  Ok(append_row(tx, user_id, -amount, before, after, entry, now))
}

/// Increments the balance.
pub fn credit_in(
  tx: &mut Tx<'_>,
  user_id: &str,
  amount: Decimal,
  entry: LedgerEntry,
  now: DateTime<Utc>,
) -> TradingResult<BalanceTransaction> {
  require_positive(amount)?;
  let mut wallet = tx
    .wallet(user_id)
    .ok_or_else(|| TradingError::WalletNotFound(user_id.to_string()))?;

  let before = wallet.virtual_balance;
  wallet.virtual_balance += amount;
  if entry.kind == TransactionKind::Deposit {
    wallet.total_deposited += amount;
  }
  let after = wallet.virtual_balance;
  tx.put_wallet(wallet);
  Ok(append_row(tx, user_id, amount, before, after, entry, now))
}

/// Adds `delta` to the user's lifetime PnL.
pub fn record_pnl_in(tx: &mut Tx<'_>, user_id: &str, delta: Decimal) -> TradingResult<()> {
  let mut wallet = tx
    .wallet(user_id)
    .ok_or_else(|| TradingError::WalletNotFound(user_id.to_string()))?;
  wallet.lifetime_pnl += delta;
  tx.put_wallet(wallet);
  Ok(())
}

// ────────────────────────────────────────────
// Service
// ────────────────────────────────────────────

/// Ranking key for [`LedgerService::leaderboard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardMetric {
  #[default]
  Pnl,
  Balance,
  Reputation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
  pub rank: usize,
  pub user_id: String,
  pub balance: Decimal,
  #[serde(rename = "lifetimePnL")]
  pub lifetime_pnl: Decimal,
  pub reputation_points: i64,
}

/// Standalone ledger operations, each in its own transaction.
pub struct LedgerService {
  store: Arc<Store>,
  initial_balance: Decimal,
  initial_points: i64,
}

impl LedgerService {
  /// Create a ledger service funding new wallets with `initial_balance`.
  pub fn new(store: Arc<Store>, initial_balance: Decimal, initial_points: i64) -> Self {
    Self {
      store,
      initial_balance,
      initial_points,
    }
  }

  /// Balance granted to new wallets.
  pub fn initial_balance(&self) -> Decimal {
    self.initial_balance
  }

  /// Provision the wallet on first use.
  #[instrument(skip(self))]
  pub async fn ensure_wallet(&self, user_id: &str) -> TradingResult<Wallet> {
    let (initial, points) = (self.initial_balance, self.initial_points);
    let user = user_id.to_string();
    let existed = self.store.read(|t| t.wallets.contains_key(user_id)).await;
    let wallet = self
      .store
      .transaction(move |tx| ensure_wallet_in(tx, &user, initial, points, Utc::now()))
      .await?;
    if !existed {
      info!(user_id, balance = %wallet.virtual_balance, "Wallet provisioned");
    }
    Ok(wallet)
  }

  /// Current wallet state.
  pub async fn wallet(&self, user_id: &str) -> TradingResult<Wallet> {
    self
      .store
      .read(|t| t.wallets.get(user_id).cloned())
      .await
      .ok_or_else(|| TradingError::WalletNotFound(user_id.to_string()))
  }

  /// Debit `amount`, failing with `InsufficientFunds` if it exceeds the balance.
  #[instrument(skip(self, entry), fields(kind = %entry.kind))]
  pub async fn debit(
    &self,
    user_id: &str,
    amount: Decimal,
    entry: LedgerEntry,
  ) -> TradingResult<BalanceTransaction> {
    let user = user_id.to_string();
    let row = self
      .store
      .transaction(move |tx| debit_in(tx, &user, amount, entry, Utc::now()))
      .await?;
    debug!(user_id, amount = %amount, balance = %row.balance_after, "Debited");
    Ok(row)
  }

  /// Credit `amount`.
  #[instrument(skip(self, entry), fields(kind = %entry.kind))]
  pub async fn credit(
    &self,
    user_id: &str,
    amount: Decimal,
    entry: LedgerEntry,
  ) -> TradingResult<BalanceTransaction> {
    let user = user_id.to_string();
    let row = self
      .store
      .transaction(move |tx| credit_in(tx, &user, amount, entry, Utc::now()))
      .await?;
    debug!(user_id, amount = %amount, balance = %row.balance_after, "Credited");
    Ok(row)
  }

  /// Read-only pre-check. The debit itself is the authoritative guard.
  pub async fn has_sufficient_balance(&self, user_id: &str, amount: Decimal) -> bool {
    self
      .store
      .read(|t| {
        t.wallets
          .get(user_id)
          .is_some_and(|w| w.virtual_balance >= amount)
      })
      .await
  }

  /// Add `delta` to lifetime PnL.
  #[instrument(skip(self))]
  pub async fn record_pnl(
    &self,
    user_id: &str,
    delta: Decimal,
    source: &str,
    reference_id: Option<&str>,
  ) -> TradingResult<()> {
    let user = user_id.to_string();
    self
      .store
      .transaction(move |tx| record_pnl_in(tx, &user, delta))
      .await?;
    debug!(user_id, delta = %delta, source, reference_id, "PnL recorded");
    Ok(())
  }

  /// Most recent ledger rows, newest first.
  pub async fn transactions(&self, user_id: &str, limit: usize) -> Vec<BalanceTransaction> {
    self
      .store
      .read(|t| {
        let mut rows: Vec<_> = t.ledger_for(user_id).cloned().collect();
        rows.reverse();
        rows.truncate(limit);
        rows
      })
      .await
  }

  /// Compare the wallet balance against the sum of its ledger rows.
  pub async fn audit(&self, user_id: &str) -> TradingResult<LedgerAudit> {
    self
      .store
      .read(|t| {
        let wallet = t
          .wallets
          .get(user_id)
          .ok_or_else(|| TradingError::WalletNotFound(user_id.to_string()))?;
        let (ledger_sum, rows) = t
          .ledger_for(user_id)
          .fold((Decimal::ZERO, 0), |(sum, n), row| (sum + row.amount, n + 1));
        Ok(LedgerAudit {
          user_id: user_id.to_string(),
          balance: wallet.virtual_balance,
          ledger_sum,
          rows,
          consistent: ledger_sum == wallet.virtual_balance && wallet.virtual_balance >= Decimal::ZERO,
        })
      })
      .await
  }

  /// Wallets ranked by `metric`, best first.
  pub async fn leaderboard(&self, metric: LeaderboardMetric, limit: usize) -> Vec<LeaderboardEntry> {
    self
      .store
      .read(|t| {
        let mut rows: Vec<LeaderboardEntry> = t
          .wallets
          .values()
          .map(|w| LeaderboardEntry {
            rank: 0,
            user_id: w.user_id.clone(),
            balance: w.virtual_balance,
            lifetime_pnl: w.lifetime_pnl,
            reputation_points: w.reputation_points,
          })
          .collect();
        rows.sort_by(|a, b| {
          let order = match metric {
            LeaderboardMetric::Pnl => b.lifetime_pnl.cmp(&a.lifetime_pnl),
            LeaderboardMetric::Balance => b.balance.cmp(&a.balance),
            LeaderboardMetric::Reputation => b.reputation_points.cmp(&a.reputation_points),
          };
          order.then_with(|| a.user_id.cmp(&b.user_id))
        });
        rows.truncate(limit);
        for (i, row) in rows.iter_mut().enumerate() {
          row.rank = i + 1;
        }
        rows
      })
      .await
  }

  /// Move reputation points between users. Points never go negative.
  #[instrument(skip(self))]
  pub async fn transfer_points(
    &self,
    from_user: &str,
    to_user: &str,
    amount: i64,
  ) -> TradingResult<(i64, i64)> {
    if amount <= 0 {
      return Err(TradingError::InvalidInput(format!(
        "points amount must be positive, got {amount}"
      )));
    }
    if from_user == to_user {
      return Err(TradingError::InvalidInput(
        "cannot transfer points to yourself".into(),
      ));
    }
    let (from, to) = (from_user.to_string(), to_user.to_string());
    let balances = self
      .store
      .transaction(move |tx| {
        let mut sender = tx
          .wallet(&from)
          .ok_or_else(|| TradingError::WalletNotFound(from.clone()))?;
        let mut recipient = tx
          .wallet(&to)
          .ok_or_else(|| TradingError::WalletNotFound(to.clone()))?;
        if sender.reputation_points < amount {
          return Err(TradingError::InsufficientPoints {
            requested: amount,
            held: sender.reputation_points,
          });
        }
        sender.reputation_points -= amount;
        recipient.reputation_points += amount;
        let balances = (sender.reputation_points, recipient.reputation_points);
        tx.put_wallet(sender);
        tx.put_wallet(recipient);
        Ok(balances)
      })
      .await?;
    info!(from_user, to_user, amount, "Points transferred");
    Ok(balances)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  fn service(initial: Decimal) -> LedgerService {
    LedgerService::new(Arc::new(Store::new()), initial, 100)
  }

  #[tokio::test]
  async fn test_new_wallet_is_funded_by_deposit_row() {
    let ledger = service(dec!(100));
    let wallet = ledger.ensure_wallet("u1").await.unwrap();
    assert_eq!(wallet.virtual_balance, dec!(100));
    assert_eq!(wallet.total_deposited, dec!(100));
    let rows = ledger.transactions("u1", 10).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, TransactionKind::Deposit);

    // second call is a no-op
    ledger.ensure_wallet("u1").await.unwrap();
    assert_eq!(ledger.transactions("u1", 10).await.len(), 1);
  }

  #[tokio::test]
  async fn test_debit_then_overdraft_is_rejected() {
    let ledger = service(dec!(100));
    ledger.ensure_wallet("u1").await.unwrap();

    let row = ledger
      .debit("u1", dec!(30), LedgerEntry::new(TransactionKind::Adjustment, "test"))
      .await
      .unwrap();
    assert_eq!(row.amount, dec!(-30));
    assert_eq!(row.balance_after, dec!(70));

    let err = ledger
      .debit("u1", dec!(80), LedgerEntry::new(TransactionKind::Adjustment, "test"))
      .await
      .unwrap_err();
    assert!(matches!(err, TradingError::InsufficientFunds { .. }));
    assert_eq!(ledger.wallet("u1").await.unwrap().virtual_balance, dec!(70));
    // deposit + one debit
    assert_eq!(ledger.transactions("u1", 10).await.len(), 2);
  }

  #[tokio::test]
  async fn test_audit_matches_ledger() {
    let ledger = service(dec!(50));
    ledger.ensure_wallet("u1").await.unwrap();
    ledger
      .credit("u1", dec!(12.5), LedgerEntry::new(TransactionKind::PaymentReceived, "p"))
      .await
      .unwrap();
    ledger
      .debit("u1", dec!(2.5), LedgerEntry::new(TransactionKind::PredBuy, "b"))
      .await
      .unwrap();
    let audit = ledger.audit("u1").await.unwrap();
    assert!(audit.consistent);
    assert_eq!(audit.balance, dec!(60));
    assert_eq!(audit.rows, 3);
  }

  #[tokio::test]
  async fn test_rejects_non_positive_amounts() {
    let ledger = service(dec!(10));
    ledger.ensure_wallet("u1").await.unwrap();
    let err = ledger
      .credit("u1", Decimal::ZERO, LedgerEntry::new(TransactionKind::Adjustment, "x"))
      .await
      .unwrap_err();
    assert!(matches!(err, TradingError::InvalidInput(_)));
  }

  #[tokio::test]
  async fn test_record_pnl_accumulates() {
    let ledger = service(dec!(10));
    ledger.ensure_wallet("u1").await.unwrap();
    ledger.record_pnl("u1", dec!(3), "test", None).await.unwrap();
    ledger.record_pnl("u1", dec!(-1), "test", None).await.unwrap();
    assert_eq!(ledger.wallet("u1").await.unwrap().lifetime_pnl, dec!(2));
  }

  #[tokio::test]
  async fn test_transfer_points() {
    let ledger = service(dec!(10));
    ledger.ensure_wallet("a").await.unwrap();
    ledger.ensure_wallet("b").await.unwrap();
    assert_eq!(ledger.transfer_points("a", "b", 40).await.unwrap(), (60, 140));
    let err = ledger.transfer_points("a", "b", 61).await.unwrap_err();
    assert!(matches!(err, TradingError::InsufficientPoints { .. }));
    assert!(ledger.transfer_points("a", "a", 1).await.is_err());
  }

  #[tokio::test]
  async fn test_leaderboard_orders_by_metric() {
    let ledger = service(dec!(100));
    ledger.ensure_wallet("a").await.unwrap();
    ledger.ensure_wallet("b").await.unwrap();
    ledger.record_pnl("b", dec!(25), "test", None).await.unwrap();
    ledger
      .debit("a", dec!(40), LedgerEntry::new(TransactionKind::PredBuy, "buy"))
      .await
      .unwrap();

    let by_pnl = ledger.leaderboard(LeaderboardMetric::Pnl, 10).await;
    assert_eq!(by_pnl[0].user_id, "b");
    assert_eq!(by_pnl[0].rank, 1);
    let by_balance = ledger.leaderboard(LeaderboardMetric::Balance, 1).await;
    assert_eq!(by_balance.len(), 1);
    assert_eq!(by_balance[0].user_id, "b");
  }
}

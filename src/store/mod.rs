//! Transactional Store - Serializable In-Process Tables
//!
//! Holds every market, position, perp position, wallet, ledger row and
//! payment intent behind a single `tokio::sync::RwLock`.
//!
//! A write transaction takes the write lock, runs a synchronous closure
//! against a staged [`Tx`] overlay, and applies the staged writes only if
//! the closure returns `Ok`. An `Err` discards the overlay, so a failed
//! trade leaves no partial state behind. Holding the write lock for the
//! whole closure makes transactions serializable.
//!
//! Committed ledger rows are forwarded to an optional journal channel
//! after the tables are updated.

mod overlay;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::domain::error::TradingResult;
use crate::domain::market::{BalanceTransaction, Market, MarketId, Position, PositionId, UserId, Wallet};
use crate::domain::payment::PaymentIntent;
use crate::domain::perp::PerpPosition;

pub use overlay::Tx;
use overlay::Changes;

/// All persisted state. Serialized as-is into the state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tables {
    pub markets: BTreeMap<MarketId, Market>,
    pub positions: BTreeMap<PositionId, Position>,
    pub perp_positions: BTreeMap<PositionId, PerpPosition>,
    pub wallets: BTreeMap<UserId, Wallet>,
    pub payments: BTreeMap<String, PaymentIntent>,
    /// Append-only balance ledger in commit order.
    pub ledger: Vec<BalanceTransaction>,
}

impl Tables {
    /// Ledger rows of one user, oldest first.
    pub fn ledger_for<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a BalanceTransaction> + 'a {
        self.ledger.iter().filter(move |row| row.user_id == user_id)
    }

    /// Positions held by one user.
    pub fn positions_for<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a Position> + 'a {
        self.positions.values().filter(move |p| p.user_id == user_id)
    }

    /// Perp positions held by one user.
    pub fn perp_positions_for<'a>(
        &'a self,
        user_id: &'a str,
    ) -> impl Iterator<Item = &'a PerpPosition> + 'a {
        self.perp_positions.values().filter(move |p| p.user_id == user_id)
    }

    fn apply(&mut self, changes: Changes) -> Vec<BalanceTransaction> {
        changes.markets.apply_to(&mut self.markets);
        changes.positions.apply_to(&mut self.positions);
        changes.perp_positions.apply_to(&mut self.perp_positions);
        changes.wallets.apply_to(&mut self.wallets);
        changes.payments.apply_to(&mut self.payments);
        self.ledger.extend(changes.ledger.iter().cloned());
        changes.ledger
    }
}

/// Shared transactional store.
#[derive(Debug, Default)]
pub struct Store {
    tables: RwLock<Tables>,
    journal: Option<mpsc::UnboundedSender<BalanceTransaction>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from previously persisted tables.
    pub fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
            journal: None,
        }
    }

    /// Forwards every committed ledger row to `journal`.
    pub fn with_journal(mut self, journal: mpsc::UnboundedSender<BalanceTransaction>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Runs `f` as one serializable transaction.
    ///
    /// All writes staged through the [`Tx`] are committed together when
    /// `f` returns `Ok`; none are when it returns `Err`.
    pub async fn transaction<T, F>(&self, f: F) -> TradingResult<T>
    where
        F: FnOnce(&mut Tx<'_>) -> TradingResult<T>,
    {
        let mut tables = self.tables.write().await;
        let (out, changes) = {
            let mut tx = Tx::new(&tables);
            let out = f(&mut tx)?;
            (out, tx.into_changes())
        };

        let committed = tables.apply(changes);
        drop(tables);

        if !committed.is_empty() {
            debug!(rows = committed.len(), "Ledger rows committed");
            if let Some(journal) = &self.journal {
                for row in committed {
                    if journal.send(row).is_err() {
                        warn!("Ledger journal channel closed; row not journaled");
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    /// Runs a read-only closure under the shared lock.
    pub async fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.read().await;
        f(&tables)
    }

    /// Clones the full table set (for snapshots).
    pub async fn snapshot(&self) -> Tables {
        self.tables.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::TradingError;
    use crate::domain::market::TransactionKind;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market::new("Q?", Utc::now() + Duration::days(1), dec!(100), dec!(100))
    }

    #[tokio::test]
    async fn test_commit_applies_all_writes() {
        let store = Store::new();
        let m = market();
        let id = m.id.clone();
        store
            .transaction(|tx| {
                tx.put_market(m);
                tx.put_wallet(Wallet::empty("u1", 0, Utc::now()));
                Ok(())
            })
            .await
            .unwrap();

        let (has_market, has_wallet) = store
            .read(|t| (t.markets.contains_key(&id), t.wallets.contains_key("u1")))
            .await;
        assert!(has_market);
        assert!(has_wallet);
    }

    #[tokio::test]
    async fn test_error_rolls_back_everything() {
        let store = Store::new();
        let result: TradingResult<()> = store
            .transaction(|tx| {
                tx.put_market(market());
                tx.put_wallet(Wallet::empty("u1", 0, Utc::now()));
                Err(TradingError::Forbidden("nope".into()))
            })
            .await;
        assert!(result.is_err());
        let tables = store.snapshot().await;
        assert!(tables.markets.is_empty());
        assert!(tables.wallets.is_empty());
    }

    #[tokio::test]
    async fn test_reads_see_staged_writes_and_deletes() {
        let store = Store::new();
        let now = Utc::now();
        let pos = Position::open("u1", "m1", crate::domain::Outcome::Yes, dec!(5), dec!(0.5), now);
        let pid = pos.id.clone();
        store
            .transaction(|tx| {
                tx.put_position(pos);
                Ok(())
            })
            .await
            .unwrap();

        store
            .transaction(|tx| {
                assert!(tx.position(&pid).is_some());
                tx.delete_position(&pid);
                assert!(tx.position(&pid).is_none());
                assert!(tx.positions_for_market("m1").is_empty());
                Ok(())
            })
            .await
            .unwrap();
        assert!(store.read(|t| t.positions.is_empty()).await);
    }

    #[tokio::test]
    async fn test_ledger_rows_reach_journal() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let store = Store::new().with_journal(sender);
        store
            .transaction(|tx| {
                tx.append_ledger(BalanceTransaction {
                    id: "t1".into(),
                    user_id: "u1".into(),
                    amount: dec!(10),
                    kind: TransactionKind::Deposit,
                    description: "seed".into(),
                    reference_id: None,
                    balance_before: Decimal::ZERO,
                    balance_after: dec!(10),
                    created_at: Utc::now(),
                });
                Ok(())
            })
            .await
            .unwrap();
        let row = receiver.recv().await.unwrap();
        assert_eq!(row.id, "t1");
        assert_eq!(store.read(|t| t.ledger.len()).await, 1);
    }
}

//! Staged writes for a single store transaction.

use std::collections::{BTreeMap, HashMap};

use crate::domain::market::{BalanceTransaction, Market, Position, Wallet};
use crate::domain::payment::PaymentIntent;
use crate::domain::perp::PerpPosition;

use super::Tables;

/// Pending writes to one table. `None` marks a deletion.
#[derive(Debug)]
pub(super) struct Overlay<V> {
    staged: HashMap<String, Option<V>>,
}

impl<V: Clone> Overlay<V> {
    fn new() -> Self {
        Self {
            staged: HashMap::new(),
        }
    }

    fn get(&self, base: &BTreeMap<String, V>, key: &str) -> Option<V> {
        match self.staged.get(key) {
            Some(staged) => staged.clone(),
            None => base.get(key).cloned(),
        }
    }

    fn put(&mut self, key: String, value: V) {
        self.staged.insert(key, Some(value));
    }

    fn delete(&mut self, key: &str) {
        self.staged.insert(key.to_string(), None);
    }

    /// Every live value matching `pred`, staged values taking precedence.
    fn filter(&self, base: &BTreeMap<String, V>, pred: impl Fn(&V) -> bool) -> Vec<V> {
        let mut out: Vec<V> = base
            .iter()
            .filter(|(k, _)| !self.staged.contains_key(*k))
            .map(|(_, v)| v)
            .filter(|v| pred(*v))
            .cloned()
            .collect();
        out.extend(self.staged.values().flatten().filter(|v| pred(*v)).cloned());
        out
    }

    pub(super) fn apply_to(self, base: &mut BTreeMap<String, V>) {
        for (key, value) in self.staged {
            match value {
                Some(v) => {
                    base.insert(key, v);
                }
                None => {
                    base.remove(&key);
                }
            }
        }
    }
}

/// Everything a committed transaction writes.
#[derive(Debug)]
pub(super) struct Changes {
    pub(super) markets: Overlay<Market>,
    pub(super) positions: Overlay<Position>,
    pub(super) perp_positions: Overlay<PerpPosition>,
    pub(super) wallets: Overlay<Wallet>,
    pub(super) payments: Overlay<PaymentIntent>,
    pub(super) ledger: Vec<BalanceTransaction>,
}

/// Transaction handle passed to [`super::Store::transaction`] closures.
///
/// Reads see committed state plus this transaction's own staged writes.
#[derive(Debug)]
pub struct Tx<'a> {
    base: &'a Tables,
    changes: Changes,
}

impl<'a> Tx<'a> {
    pub(super) fn new(base: &'a Tables) -> Self {
        Self {
            base,
            changes: Changes {
                markets: Overlay::new(),
                positions: Overlay::new(),
                perp_positions: Overlay::new(),
                wallets: Overlay::new(),
                payments: Overlay::new(),
                ledger: Vec::new(),
            },
        }
    }

    pub(super) fn into_changes(self) -> Changes {
        self.changes
    }

    // ── markets ──

    pub fn market(&self, id: &str) -> Option<Market> {
        self.changes.markets.get(&self.base.markets, id)
    }

    pub fn put_market(&mut self, market: Market) {
        self.changes.markets.put(market.id.clone(), market);
    }

    // ── prediction positions ──

    pub fn position(&self, id: &str) -> Option<Position> {
        self.changes.positions.get(&self.base.positions, id)
    }

    /// The user's position on one side of a market, if any.
    pub fn find_position(&self, user_id: &str, market_id: &str, side: crate::domain::Outcome) -> Option<Position> {
        self.changes
            .positions
            .filter(&self.base.positions, |p| {
                p.user_id == user_id && p.market_id == market_id && p.side == side
            })
            .into_iter()
            .next()
    }

    pub fn positions_for_market(&self, market_id: &str) -> Vec<Position> {
        self.changes
            .positions
            .filter(&self.base.positions, |p| p.market_id == market_id)
    }

    pub fn put_position(&mut self, position: Position) {
        self.changes.positions.put(position.id.clone(), position);
    }

    pub fn delete_position(&mut self, id: &str) {
        self.changes.positions.delete(id);
    }

    // ── perp positions ──

    pub fn perp_position(&self, id: &str) -> Option<PerpPosition> {
        self.changes.perp_positions.get(&self.base.perp_positions, id)
    }

    pub fn put_perp_position(&mut self, position: PerpPosition) {
        self.changes.perp_positions.put(position.id.clone(), position);
    }

    // ── wallets ──

    pub fn wallet(&self, user_id: &str) -> Option<Wallet> {
        self.changes.wallets.get(&self.base.wallets, user_id)
    }

    pub fn put_wallet(&mut self, wallet: Wallet) {
        self.changes.wallets.put(wallet.user_id.clone(), wallet);
    }

    // ── payments ──

    pub fn payment(&self, id: &str) -> Option<PaymentIntent> {
        self.changes.payments.get(&self.base.payments, id)
    }

    /// The intent a transaction hash is bound to, if any.
    pub fn payment_by_hash(&self, tx_hash: &str) -> Option<PaymentIntent> {
        let wanted = tx_hash.to_ascii_lowercase();
        self.changes
            .payments
            .filter(&self.base.payments, |p| p.tx_hash.as_deref() == Some(wanted.as_str()))
            .into_iter()
            .next()
    }

    pub fn payments_where(&self, pred: impl Fn(&PaymentIntent) -> bool) -> Vec<PaymentIntent> {
        self.changes.payments.filter(&self.base.payments, pred)
    }

    pub fn put_payment(&mut self, intent: PaymentIntent) {
        self.changes.payments.put(intent.id.clone(), intent);
    }

    // ── ledger ──

    pub fn append_ledger(&mut self, row: BalanceTransaction) {
        self.changes.ledger.push(row);
    }
}

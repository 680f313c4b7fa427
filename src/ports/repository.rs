//! Repository Port - State Persistence Interface
//!
//! Defines the persistence boundary: a full snapshot of the store tables
//! for crash recovery, plus an append-only JSONL journal of committed
//! ledger rows for auditing.

use async_trait::async_trait;

use crate::domain::market::BalanceTransaction;
use crate::store::Tables;

/// Trait for state persistence providers.
///
/// Journal entries use JSONL (JSON Lines): each line is a self-contained
/// record, so a partial write loses at most the last line.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
  /// Append committed ledger rows to the journal.
  async fn append_ledger(&self, rows: &[BalanceTransaction]) -> anyhow::Result<()>;

  /// Load every journaled ledger row.
  async fn load_ledger(&self) -> anyhow::Result<Vec<BalanceTransaction>>;

  /// Atomically replace the state snapshot.
  async fn save_snapshot(&self, tables: &Tables) -> anyhow::Result<()>;

  /// Load the most recent snapshot, if any.
  async fn load_snapshot(&self) -> anyhow::Result<Option<Tables>>;

  /// Check if the repository is writable.
  async fn is_healthy(&self) -> bool;
}

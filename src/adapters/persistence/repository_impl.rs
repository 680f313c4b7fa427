//! Repository Implementation - Concrete Adapter for the Repository Port
//!
//! Wraps `StateStore` (atomic JSON snapshots) and `LedgerJournal`
//! (JSONL append-only files) into a single struct that implements the
//! `Repository` trait from `crate::ports::repository`.

use anyhow::Result;
use async_trait::async_trait;

use super::journal::LedgerJournal;
use super::state::StateStore;
use crate::domain::market::BalanceTransaction;
use crate::ports::repository::Repository;
use crate::store::Tables;

/// Concrete repository adapter combining snapshot and journal persistence.
pub struct RepositoryImpl {
    /// Atomic JSON state store.
    state_store: StateStore,
    /// JSONL ledger journal.
    journal: LedgerJournal,
}

impl RepositoryImpl {
    /// Create a new repository from existing store and journal instances.
    pub fn new(state_store: StateStore, journal: LedgerJournal) -> Self {
        Self {
            state_store,
            journal,
        }
    }

    /// Create a new repository rooted at a data directory.
    pub async fn from_data_dir(data_dir: &str) -> Result<Self> {
        let state_store = StateStore::new(data_dir).await?;
        let journal = LedgerJournal::new(data_dir).await?;
        Ok(Self::new(state_store, journal))
    }
}

#[async_trait]
impl Repository for RepositoryImpl {
    async fn append_ledger(&self, rows: &[BalanceTransaction]) -> Result<()> {
        self.journal.append(rows).await
    }

    async fn load_ledger(&self) -> Result<Vec<BalanceTransaction>> {
        self.journal.load_all().await
    }

    async fn save_snapshot(&self, tables: &Tables) -> Result<()> {
        self.state_store.save(tables).await
    }

    async fn load_snapshot(&self) -> Result<Option<Tables>> {
        self.state_store.load().await
    }

    async fn is_healthy(&self) -> bool {
        self.state_store.is_healthy().await && self.journal.is_healthy().await
    }
}

//! Persistence Adapters - JSON Snapshots and JSONL Ledger Journal
//!
//! Implements the Repository port using an atomic JSON snapshot of the
//! store tables and append-only JSONL files of committed ledger rows.
//! No database dependency; lightweight and crash-recoverable.

pub mod journal;
pub mod repository_impl;
pub mod state;

pub use journal::{LedgerJournal, run_journal_writer};
pub use repository_impl::RepositoryImpl;
pub use state::StateStore;

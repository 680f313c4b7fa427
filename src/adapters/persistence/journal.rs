//! Ledger Journal - Append-only JSONL Ledger Rows
//!
//! Persists committed ledger rows to daily JSONL files named
//! `ledger/YYYY-MM-DD.jsonl`. Each line is a self-contained JSON
//! record, so the journal can be streamed and audited line by line
//! independently of the state snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::domain::market::BalanceTransaction;
use crate::ports::repository::Repository;

/// Most rows written per batch by the journal writer.
const MAX_BATCH: usize = 256;

/// Append-only JSONL ledger journal with daily file rotation.
pub struct LedgerJournal {
    /// Directory for daily ledger files.
    ledger_dir: PathBuf,
}

impl LedgerJournal {
    /// Create a new journal in the given data directory.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let ledger_dir = Path::new(data_dir).join("ledger");
        fs::create_dir_all(&ledger_dir)
            .await
            .context("Failed to create ledger directory")?;
        Ok(Self { ledger_dir })
    }

    /// Append rows to the file for the day each row was created.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn append(&self, rows: &[BalanceTransaction]) -> Result<()> {
        let mut start = 0;
        while start < rows.len() {
            let date = rows[start].created_at.format("%Y-%m-%d").to_string();
            let end = rows[start..]
                .iter()
                .position(|r| r.created_at.format("%Y-%m-%d").to_string() != date)
                .map_or(rows.len(), |offset| start + offset);

            let mut buf = String::new();
            for row in &rows[start..end] {
                buf.push_str(
                    &serde_json::to_string(row).context("Failed to serialize ledger row")?,
                );
                buf.push('\n');
            }

            let path = self.ledger_dir.join(format!("{date}.jsonl"));
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .context("Failed to open ledger journal file")?;
            file.write_all(buf.as_bytes())
                .await
                .context("Failed to write ledger rows")?;
            file.flush().await.context("Failed to flush ledger journal")?;

            start = end;
        }
        Ok(())
    }

    /// Load every row from all daily files, oldest first.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<BalanceTransaction>> {
        let mut rows = Vec::new();
        let mut entries = fs::read_dir(&self.ledger_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                let content = fs::read_to_string(&path).await?;
                for line in content.lines().filter(|l| !l.trim().is_empty()) {
                    match serde_json::from_str::<BalanceTransaction>(line) {
                        Ok(row) => rows.push(row),
                        Err(e) => {
                            warn!(
                                file = %path.display(),
                                error = %e,
                                "Skipping malformed ledger row"
                            );
                        }
                    }
                }
            }
        }

        rows.sort_by_key(|r| r.created_at);
        info!(count = rows.len(), "Loaded ledger journal");
        Ok(rows)
    }

    /// Check if the ledger directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let marker = self.ledger_dir.join(".health_check");
        let result = fs::write(&marker, b"ok").await;
        let _ = fs::remove_file(&marker).await;
        result.is_ok()
    }
}

/// Drain committed ledger rows from the store into the repository.
///
/// Runs until every sender is dropped; rows already queued are written
/// before returning.
pub async fn run_journal_writer(
    repository: Arc<dyn Repository>,
    mut rows: mpsc::UnboundedReceiver<BalanceTransaction>,
) {
    info!("Ledger journal writer started");
    let mut batch = Vec::with_capacity(MAX_BATCH);
    while let Some(row) = rows.recv().await {
        batch.push(row);
        while batch.len() < MAX_BATCH {
            match rows.try_recv() {
                Ok(row) => batch.push(row),
                Err(_) => break,
            }
        }
        if let Err(e) = repository.append_ledger(&batch).await {
            warn!(error = %e, rows = batch.len(), "Failed to journal ledger rows");
        } else {
            debug!(rows = batch.len(), "Ledger rows journaled");
        }
        batch.clear();
    }
    info!("Ledger journal writer stopped");
}

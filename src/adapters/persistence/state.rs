//! State Store - Atomic JSON Snapshot of the Store Tables
//!
//! Saves the full table set to `state.json` using atomic writes
//! (write to tmp file, then rename). The file is always either the
//! old or the new snapshot, never a partial write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, instrument};

use crate::store::Tables;

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// On-disk snapshot envelope.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    version: u32,
    saved_at_ms: i64,
    tables: Tables,
}

/// Atomic JSON snapshot store for crash recovery.
pub struct StateStore {
    /// Path to state.json.
    state_path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl StateStore {
    /// Create a new state store in the given data directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            state_path: dir.join("state.json"),
            tmp_path: dir.join("state.json.tmp"),
        })
    }

    /// Save a snapshot atomically (tmp -> rename).
    #[instrument(skip(self, tables))]
    pub async fn save(&self, tables: &Tables) -> Result<()> {
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            saved_at_ms: chrono::Utc::now().timestamp_millis(),
            tables: tables.clone(),
        };
        let json = serde_json::to_vec(&file).context("Failed to serialize state")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp state file")?;

        fs::rename(&self.tmp_path, &self.state_path)
            .await
            .context("Failed to rename state file")?;

        info!(
            path = %self.state_path.display(),
            markets = tables.markets.len(),
            wallets = tables.wallets.len(),
            ledger_rows = tables.ledger.len(),
            "State snapshot saved"
        );

        Ok(())
    }

    /// Load the most recent snapshot.
    ///
    /// Returns `None` if no state file exists (first startup).
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<Tables>> {
        if !fs::try_exists(&self.state_path).await.unwrap_or(false) {
            info!("No state file found, starting fresh");
            return Ok(None);
        }

        let json = fs::read(&self.state_path)
            .await
            .context("Failed to read state file")?;

        let file: SnapshotFile =
            serde_json::from_slice(&json).context("Failed to parse state JSON")?;
        anyhow::ensure!(
            file.version == SNAPSHOT_VERSION,
            "Unsupported snapshot version {}",
            file.version
        );

        info!(
            markets = file.tables.markets.len(),
            wallets = file.tables.wallets.len(),
            "State snapshot loaded"
        );

        Ok(Some(file.tables))
    }

    /// Check if the data directory is reachable.
    pub async fn is_healthy(&self) -> bool {
        match self.state_path.parent() {
            Some(dir) => fs::metadata(dir).await.is_ok(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Market;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn temp_dir(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("a2a-state-{tag}-{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned()
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = temp_dir("roundtrip");
        let store = StateStore::new(&dir).await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        let mut tables = Tables::default();
        let market = Market::new("Q?", Utc::now() + Duration::days(1), dec!(5), dec!(7));
        tables.markets.insert(market.id.clone(), market);
        store.save(&tables).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, tables);
        let _ = fs::remove_dir_all(&dir).await;
    }
}

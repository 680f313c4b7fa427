//! Read-Through Cache - TTL Entries with Explicit Invalidation
//!
//! Caches read-mostly lookups (market snapshots) for a short TTL.
//! Writers invalidate the affected key after their transaction commits,
//! so a cached value is never older than the last committed trade.
//!
//! Fills are generation-checked: a reader takes `generation()` before it
//! reads the store and its fill is dropped if any invalidation ran since.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Cached entry with staleness tracking.
#[derive(Debug, Clone)]
struct CachedEntry<V> {
  value: V,
  updated_at: DateTime<Utc>,
}

impl<V> CachedEntry<V> {
  fn is_stale(&self, max_age_secs: i64, now: DateTime<Utc>) -> bool {
    (now - self.updated_at).num_seconds() >= max_age_secs
  }
}

/// String-keyed TTL cache.
#[derive(Debug)]
pub struct TtlCache<V> {
  entries: RwLock<HashMap<String, CachedEntry<V>>>,
  /// Bumped by every invalidation, under the entries write lock.
  generation: AtomicU64,
  /// Maximum entry age in seconds. Zero disables caching.
  ttl_secs: i64,
}

impl<V: Clone> TtlCache<V> {
  /// Create a cache whose entries live `ttl_secs`.
  pub fn new(ttl_secs: i64) -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      generation: AtomicU64::new(0),
      ttl_secs,
    }
  }

  /// Fresh value for `key`, if any.
  pub async fn get(&self, key: &str) -> Option<V> {
    let entries = self.entries.read().await;
    entries
      .get(key)
      .filter(|e| !e.is_stale(self.ttl_secs, Utc::now()))
      .map(|e| e.value.clone())
  }

  /// Current invalidation generation. Take it before reading the source.
  pub fn generation(&self) -> u64 {
    self.generation.load(Ordering::Acquire)
  }

  /// Store `value` under `key` unless an invalidation ran after `seen`.
  ///
  /// Returns whether the value was stored.
  pub async fn insert_if_current(&self, key: &str, value: V, seen: u64) -> bool {
    if self.ttl_secs <= 0 {
      return false;
    }
    let mut entries = self.entries.write().await;
    if self.generation.load(Ordering::Acquire) != seen {
      return false;
    }
    entries.insert(
      key.to_string(),
      CachedEntry {
        value,
        updated_at: Utc::now(),
      },
    );
    true
  }

  /// Drop `key`.
  pub async fn invalidate(&self, key: &str) {
    let mut entries = self.entries.write().await;
    self.generation.fetch_add(1, Ordering::AcqRel);
    entries.remove(key);
  }

  /// Drop everything.
  pub async fn clear(&self) {
    let mut entries = self.entries.write().await;
    self.generation.fetch_add(1, Ordering::AcqRel);
    entries.clear();
  }
}

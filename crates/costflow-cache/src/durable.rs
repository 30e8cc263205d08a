//! Category-tagged cache over a [`RecordStore`].
//!
//! Store failures never reach callers: each operation logs a warning and
//! returns a safe default (miss, no-op, zero). A cache opened without a
//! usable store behaves as permanently empty.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use costflow_core::config::CacheConfig;
use costflow_core::dataset::now_millis;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::CacheProvider;
use crate::store::{CacheRecord, FsRecordStore, MemoryRecordStore, RecordStore};

/// Category applied by [`CacheProvider::set`].
pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub by_category: BTreeMap<String, usize>,
    pub oldest_created_ms: Option<u64>,
    pub newest_created_ms: Option<u64>,
}

pub struct DurableCache {
    store: Option<Box<dyn RecordStore>>,
    default_ttl: Option<Duration>,
}

impl std::fmt::Debug for DurableCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableCache")
            .field("available", &self.store.is_some())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl DurableCache {
    pub fn with_store(store: Box<dyn RecordStore>, default_ttl: Option<Duration>) -> Self {
        Self {
            store: Some(store),
            default_ttl,
        }
    }

    /// Open a file-backed cache. If the directory cannot be used the cache
    /// still opens, as a no-op.
    pub fn open(dir: impl AsRef<Path>, default_ttl: Option<Duration>) -> Self {
        match FsRecordStore::open(dir.as_ref()) {
            Ok(store) => Self::with_store(Box::new(store), default_ttl),
            Err(e) => {
                tracing::warn!(dir = %dir.as_ref().display(), error = %e, "durable cache unavailable; continuing without it");
                Self::unavailable(default_ttl)
            }
        }
    }

    pub fn in_memory(default_ttl: Option<Duration>) -> Self {
        Self::with_store(Box::new(MemoryRecordStore::new()), default_ttl)
    }

    pub fn unavailable(default_ttl: Option<Duration>) -> Self {
        Self {
            store: None,
            default_ttl,
        }
    }

    /// File-backed when `durable_dir` is set, otherwise unavailable.
    pub fn from_config(cfg: &CacheConfig) -> Self {
        match &cfg.durable_dir {
            Some(dir) => Self::open(dir, cfg.default_ttl()),
            None => Self::unavailable(cfg.default_ttl()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn set_with_category(&self, key: &str, value: Value, ttl: Option<Duration>, category: &str) {
        let Some(store) = &self.store else { return };
        let now = now_millis();
        let record = CacheRecord {
            key: key.to_string(),
            value,
            expires_at: ttl
                .or(self.default_ttl)
                .map(|d| now.saturating_add(d.as_millis() as u64)),
            created_at: now,
            category: category.to_string(),
        };
        if let Err(e) = store.put(record) {
            tracing::warn!(key, error = %e, "durable cache write failed");
        }
    }

    /// Remove every entry of a category. Returns how many were removed.
    pub fn clear_by_type(&self, category: &str) -> usize {
        let Some(store) = &self.store else { return 0 };
        let keys = match store.keys_by_category(category) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(category, error = %e, "durable cache category lookup failed");
                return 0;
            }
        };
        remove_all(store.as_ref(), &keys)
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let Some(store) = &self.store else { return 0 };
        let keys = match store.keys_expired_at(now_millis()) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "durable cache expiry lookup failed");
                return 0;
            }
        };
        let removed = remove_all(store.as_ref(), &keys);
        if removed > 0 {
            tracing::debug!(removed, "durable cache cleanup");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let Some(store) = &self.store else {
            return CacheStats::default();
        };
        let records = match store.records() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "durable cache stats unavailable");
                return CacheStats::default();
            }
        };

        let mut stats = CacheStats::default();
        for r in &records {
            stats.total_entries += 1;
            stats.total_size_bytes += r.approx_size();
            *stats.by_category.entry(r.category.clone()).or_default() += 1;
            stats.oldest_created_ms = Some(stats.oldest_created_ms.map_or(r.created_at, |o| o.min(r.created_at)));
            stats.newest_created_ms = Some(stats.newest_created_ms.map_or(r.created_at, |n| n.max(r.created_at)));
        }
        stats
    }
}

fn remove_all(store: &dyn RecordStore, keys: &[String]) -> usize {
    let mut removed = 0;
    for key in keys {
        match store.remove(key) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "durable cache delete failed"),
        }
    }
    removed
}

impl CacheProvider for DurableCache {
    fn get(&self, key: &str) -> Option<Value> {
        let store = self.store.as_ref()?;
        let record = match store.get(key) {
            Ok(record) => record?,
            Err(e) => {
                tracing::warn!(key, error = %e, "durable cache read failed");
                return None;
            }
        };
        if record.is_expired(now_millis()) {
            if let Err(e) = store.remove(key) {
                tracing::warn!(key, error = %e, "durable cache evict failed");
            }
            return None;
        }
        Some(record.value)
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        self.set_with_category(key, value, ttl, DEFAULT_CATEGORY);
    }

    fn delete(&self, key: &str) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.remove(key) {
            tracing::warn!(key, error = %e, "durable cache delete failed");
        }
    }

    fn clear(&self) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.clear() {
            tracing::warn!(error = %e, "durable cache clear failed");
        }
    }
}

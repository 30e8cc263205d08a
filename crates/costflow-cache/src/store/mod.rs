//! Persistence seam for the durable cache.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub mod fs;
pub mod memory;

pub use fs::FsRecordStore;
pub use memory::MemoryRecordStore;

/// One persisted cache entry. Timestamps are milliseconds since Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: String,
    pub value: Value,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<u64>,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
    /// Category used for bulk invalidation.
    #[serde(rename = "type")]
    pub category: String,
}

impl CacheRecord {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at.map_or(false, |at| now_ms >= at)
    }

    /// Serialized size in bytes, used for cache statistics.
    pub fn approx_size(&self) -> u64 {
        serde_json::to_vec(self).map(|b| b.len() as u64).unwrap_or(0)
    }
}

/// Minimal keyed record store with secondary lookups by category and expiry.
///
/// Implementations must be thread-safe.
pub trait RecordStore: Send + Sync {
    /// Insert or replace the record under `record.key`.
    fn put(&self, record: CacheRecord) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<CacheRecord>>;

    /// Returns whether a record was removed.
    fn remove(&self, key: &str) -> Result<bool>;

    fn keys_by_category(&self, category: &str) -> Result<Vec<String>>;

    /// Keys whose expiry is at or before `now_ms`.
    fn keys_expired_at(&self, now_ms: u64) -> Result<Vec<String>>;

    fn records(&self) -> Result<Vec<CacheRecord>>;

    fn clear(&self) -> Result<()>;
}

/// Secondary indexes kept alongside the primary records.
#[derive(Debug, Default)]
pub(crate) struct RecordIndex {
    by_category: BTreeMap<String, BTreeSet<String>>,
    by_expiry: BTreeSet<(u64, String)>,
}

impl RecordIndex {
    pub(crate) fn insert(&mut self, record: &CacheRecord) {
        self.by_category
            .entry(record.category.clone())
            .or_default()
            .insert(record.key.clone());
        if let Some(at) = record.expires_at {
            self.by_expiry.insert((at, record.key.clone()));
        }
    }

    pub(crate) fn remove(&mut self, record: &CacheRecord) {
        if let Some(keys) = self.by_category.get_mut(&record.category) {
            keys.remove(&record.key);
            if keys.is_empty() {
                self.by_category.remove(&record.category);
            }
        }
        if let Some(at) = record.expires_at {
            self.by_expiry.remove(&(at, record.key.clone()));
        }
    }

    pub(crate) fn by_category(&self, category: &str) -> Vec<String> {
        self.by_category
            .get(category)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn expired_at(&self, now_ms: u64) -> Vec<String> {
        self.by_expiry
            .iter()
            .take_while(|(at, _)| *at <= now_ms)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.by_category.clear();
        self.by_expiry.clear();
    }
}

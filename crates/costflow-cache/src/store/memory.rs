//! In-memory record store for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{CacheRecord, RecordIndex, RecordStore};
use crate::error::Result;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, CacheRecord>,
    index: RecordIndex,
}

/// Thread-safe `HashMap`-backed store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for MemoryRecordStore {
    fn put(&self, record: CacheRecord) -> Result<()> {
        let mut inner = self.lock();
        if let Some(old) = inner.records.remove(&record.key) {
            inner.index.remove(&old);
        }
        inner.index.insert(&record);
        inner.records.insert(record.key.clone(), record);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<CacheRecord>> {
        Ok(self.lock().records.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut inner = self.lock();
        match inner.records.remove(key) {
            Some(old) => {
                inner.index.remove(&old);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn keys_by_category(&self, category: &str) -> Result<Vec<String>> {
        Ok(self.lock().index.by_category(category))
    }

    fn keys_expired_at(&self, now_ms: u64) -> Result<Vec<String>> {
        Ok(self.lock().index.expired_at(now_ms))
    }

    fn records(&self) -> Result<Vec<CacheRecord>> {
        Ok(self.lock().records.values().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.records.clear();
        inner.index.clear();
        Ok(())
    }
}

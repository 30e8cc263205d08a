//! One-JSON-file-per-record store rooted at a directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use costflow_core::hash::hash_str;

use super::{CacheRecord, RecordIndex, RecordStore};
use crate::error::{CacheError, Result};

/// File-backed store. Secondary indexes live in memory and are rebuilt from
/// the directory on `open`.
#[derive(Debug)]
pub struct FsRecordStore {
    root: PathBuf,
    index: Mutex<RecordIndex>,
}

impl FsRecordStore {
    /// Create the directory if needed and index the records already in it.
    /// Files that do not decode are skipped.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| CacheError::Unavailable(format!("mkdir {}: {e}", root.display())))?;

        let mut index = RecordIndex::default();
        let entries = fs::read_dir(&root).map_err(|e| CacheError::Unavailable(format!("read_dir: {e}")))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(record) => index.insert(&record),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable cache record"),
            }
        }

        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", hash_str(key).short_hex(32)))
    }

    fn lock(&self) -> MutexGuard<'_, RecordIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, key: &str) -> Result<Option<CacheRecord>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let record = read_record(&path)?;
        // Hash collisions on the file name would surface here.
        Ok((record.key == key).then_some(record))
    }
}

fn read_record(path: &Path) -> Result<CacheRecord> {
    let bytes = fs::read(path).map_err(|e| CacheError::Store(format!("read: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl RecordStore for FsRecordStore {
    fn put(&self, record: CacheRecord) -> Result<()> {
        let mut index = self.lock();
        if let Some(old) = self.load(&record.key)? {
            index.remove(&old);
        }

        let path = self.path_for(&record.key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(&record)?;
        fs::write(&tmp, bytes).map_err(|e| CacheError::Store(format!("write: {e}")))?;
        fs::rename(&tmp, &path).map_err(|e| CacheError::Store(format!("rename: {e}")))?;

        index.insert(&record);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<CacheRecord>> {
        let _guard = self.lock();
        self.load(key)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut index = self.lock();
        let Some(old) = self.load(key)? else {
            return Ok(false);
        };
        fs::remove_file(self.path_for(key)).map_err(|e| CacheError::Store(format!("delete: {e}")))?;
        index.remove(&old);
        Ok(true)
    }

    fn keys_by_category(&self, category: &str) -> Result<Vec<String>> {
        Ok(self.lock().by_category(category))
    }

    fn keys_expired_at(&self, now_ms: u64) -> Result<Vec<String>> {
        Ok(self.lock().expired_at(now_ms))
    }

    fn records(&self) -> Result<Vec<CacheRecord>> {
        let _guard = self.lock();
        let entries = fs::read_dir(&self.root).map_err(|e| CacheError::Store(format!("read_dir: {e}")))?;
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(record) = read_record(&path) {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn clear(&self) -> Result<()> {
        let mut index = self.lock();
        let entries = fs::read_dir(&self.root).map_err(|e| CacheError::Store(format!("read_dir: {e}")))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                fs::remove_file(&path).map_err(|e| CacheError::Store(format!("delete: {e}")))?;
            }
        }
        index.clear();
        Ok(())
    }
}

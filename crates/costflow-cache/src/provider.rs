//! The cache contract shared by every provider.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Key/value store with per-entry time-to-live.
///
/// Invariants:
/// - An entry is readable iff it has no expiry or `now < expires_at`.
/// - Reading an expired entry is a miss and evicts it.
/// - `set` with `ttl = None` applies the provider's default TTL.
/// - Concurrent writers to one key are last-write-wins.
pub trait CacheProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    fn delete(&self, key: &str);

    fn clear(&self);
}

/// Typed helpers over any provider (including `dyn CacheProvider`).
pub trait CacheProviderExt: CacheProvider {
    /// Read and decode a value. A value that no longer decodes is a miss.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(key, error = %e, "cached value failed to decode; treating as miss");
                None
            }
        }
    }

    fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl);
        Ok(())
    }
}

impl<C: CacheProvider + ?Sized> CacheProviderExt for C {}

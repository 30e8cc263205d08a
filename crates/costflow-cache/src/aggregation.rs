//! Memoization of expensive lookups (definition loads, aggregations).

use std::sync::Arc;
use std::time::Duration;

use costflow_core::hash::hash_serde;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};
use crate::provider::{CacheProvider, CacheProviderExt};

/// Namespaced cache whose keys are `"{namespace}:{name}:{params-hash}"`.
#[derive(Clone)]
pub struct AggregationCache {
    provider: Arc<dyn CacheProvider>,
    namespace: String,
    ttl: Duration,
}

impl AggregationCache {
    pub fn new(provider: Arc<dyn CacheProvider>, namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            provider,
            namespace: namespace.into(),
            ttl,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key_for<P: Serialize + ?Sized>(&self, name: &str, params: &P) -> Result<String> {
        let digest = hash_serde(params).map_err(|e| CacheError::Serde(e.to_string()))?;
        Ok(format!("{}:{}:{}", self.namespace, name, digest.short_hex(16)))
    }

    pub fn get<T, P>(&self, name: &str, params: &P) -> Option<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let key = self.key_for(name, params).ok()?;
        self.provider.get_as(&key)
    }

    pub fn put<T, P>(&self, name: &str, params: &P, value: &T) -> Result<()>
    where
        T: Serialize,
        P: Serialize + ?Sized,
    {
        let key = self.key_for(name, params)?;
        self.provider.set_as(&key, value, Some(self.ttl))
    }

    /// Return the cached value or compute, store and return it. Compute
    /// errors are returned unchanged and nothing is cached.
    pub fn get_or_try_insert_with<T, P, E, F>(&self, name: &str, params: &P, compute: F) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        P: Serialize + ?Sized,
        E: From<CacheError>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let key = self.key_for(name, params)?;
        if let Some(hit) = self.provider.get_as::<T>(&key) {
            tracing::trace!(key = %key, "aggregation cache hit");
            return Ok(hit);
        }
        let value = compute()?;
        self.provider.set_as(&key, &value, Some(self.ttl))?;
        Ok(value)
    }

    pub fn invalidate<P: Serialize + ?Sized>(&self, name: &str, params: &P) {
        if let Ok(key) = self.key_for(name, params) {
            self.provider.delete(&key);
        }
    }
}

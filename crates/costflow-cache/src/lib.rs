#![forbid(unsafe_code)]
//! costflow-cache: TTL-bounded key/value caches shared by enrichment steps.
//!
//! Two providers implement the same [`CacheProvider`] contract:
//! - [`VolatileCache`]: in-memory, size-bounded, insertion-ordered eviction,
//!   lazy expiry on read plus an optional background sweep.
//! - [`DurableCache`]: records tagged with a category for bulk invalidation,
//!   persisted through a [`RecordStore`]. Every operation degrades to a no-op
//!   when the backing store is unavailable.
//!
//! [`AggregationCache`] layers namespaced, parameter-hashed keys on top of any
//! provider. Nothing here is a process-wide singleton; callers own lifecycles.

pub mod aggregation;
pub mod durable;
pub mod error;
pub mod provider;
pub mod store;
pub mod volatile;

pub use aggregation::AggregationCache;
pub use durable::{CacheStats, DurableCache, DEFAULT_CATEGORY};
pub use error::{CacheError, Result};
pub use provider::{CacheProvider, CacheProviderExt};
pub use store::{CacheRecord, FsRecordStore, MemoryRecordStore, RecordStore};
pub use volatile::VolatileCache;

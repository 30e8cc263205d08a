//! In-memory TTL cache with insertion-ordered eviction.

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use costflow_core::config::CacheConfig;
use serde_json::Value;

use crate::provider::CacheProvider;

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
    /// Insertion sequence; overwriting a key keeps its original slot.
    seq: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl State {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

type Shared = Arc<Mutex<State>>;

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // Poisoned: keep serving the last consistent state.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Background thread that periodically purges expired entries.
///
/// Holds only a weak reference to the state; dropping the cache closes the
/// stop channel and joins the thread.
#[derive(Debug)]
struct Sweeper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    fn spawn(state: Weak<Mutex<State>>, interval: Duration) -> Option<Self> {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("costflow-cache-sweep".into())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(state) = state.upgrade() else { break };
                        let purged = lock(&state).purge_expired(Instant::now());
                        if purged > 0 {
                            tracing::debug!(purged, "volatile cache sweep");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match handle {
            Ok(handle) => Some(Self {
                stop: Some(tx),
                handle: Some(handle),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "could not start cache sweeper; relying on lazy expiry");
                None
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Size-bounded in-memory cache.
///
/// At capacity, inserting a new key evicts the entry with the oldest
/// insertion (not least-recently-used). Expired entries are dropped lazily on
/// `get` and, when a sweep interval is configured, by a background thread.
#[derive(Debug)]
pub struct VolatileCache {
    state: Shared,
    default_ttl: Option<Duration>,
    max_entries: usize,
    _sweeper: Option<Sweeper>,
}

impl VolatileCache {
    /// `default_ttl = None` keeps entries until evicted; `sweep_interval = None`
    /// disables the background sweeper.
    pub fn new(
        default_ttl: Option<Duration>,
        max_entries: usize,
        sweep_interval: Option<Duration>,
    ) -> Self {
        let state: Shared = Arc::new(Mutex::new(State::default()));
        let sweeper = sweep_interval
            .filter(|d| !d.is_zero())
            .and_then(|d| Sweeper::spawn(Arc::downgrade(&state), d));
        Self {
            state,
            default_ttl,
            max_entries: max_entries.max(1),
            _sweeper: sweeper,
        }
    }

    pub fn from_config(cfg: &CacheConfig) -> Self {
        Self::new(cfg.default_ttl(), cfg.max_entries, cfg.sweep_interval())
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Live-key check; does not evict.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        lock(&self.state)
            .entries
            .get(key)
            .map_or(false, |e| !e.is_expired(now))
    }

    /// Drop every expired entry now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        lock(&self.state).purge_expired(Instant::now())
    }
}

impl CacheProvider for VolatileCache {
    fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut state = lock(&self.state);
        let expired = state.entries.get(key)?.is_expired(now);
        if expired {
            state.remove(key);
            return None;
        }
        state.entries.get(key).map(|e| e.value.clone())
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let expires_at = ttl.or(self.default_ttl).map(|d| Instant::now() + d);
        let mut state = lock(&self.state);

        if let Some(entry) = state.entries.get_mut(key) {
            entry.value = value;
            entry.expires_at = expires_at;
            return;
        }

        while state.entries.len() >= self.max_entries {
            match state.evict_oldest() {
                Some(evicted) => tracing::trace!(key = %evicted, "volatile cache evicted oldest entry"),
                None => break,
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.insert(seq, key.to_string());
        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                seq,
            },
        );
    }

    fn delete(&self, key: &str) {
        lock(&self.state).remove(key);
    }

    fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.order.clear();
    }
}

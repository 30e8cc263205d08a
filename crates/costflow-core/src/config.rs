//! Engine configuration that downstream crates can serialize/deserialize.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Top-level configuration: one section per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pipeline: PipelineConfig,
    pub cache: CacheConfig,
    pub enrich: EnrichConfig,
}

/// Orchestrator failure policy and deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Skip failing steps (input passed through unchanged) instead of aborting.
    pub continue_on_error: bool,

    /// Hard deadline for one run, checked at step boundaries.
    pub max_duration_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            max_duration_ms: None,
        }
    }
}

impl PipelineConfig {
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without one. `0` keeps entries until
    /// they are evicted or deleted.
    pub default_ttl_ms: u64,

    /// Capacity of the volatile cache; the oldest-inserted entry is evicted beyond it.
    pub max_entries: usize,

    /// Background sweep interval for the volatile cache. `None` disables the sweeper.
    pub sweep_interval_ms: Option<u64>,

    /// Directory for the durable cache. `None` means no durable store.
    pub durable_dir: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 5 * 60 * 1000,
            max_entries: 1_000,
            sweep_interval_ms: Some(60 * 1000),
            durable_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_ms > 0).then(|| Duration::from_millis(self.default_ttl_ms))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms.map(Duration::from_millis)
    }
}

/// Knobs shared by the rule-based steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    /// Ceiling on source rows materialized for one step's working view.
    pub max_source_rows: usize,

    /// TTL for cached tag rule sets (kept short so rule edits show up quickly).
    pub rule_cache_ttl_ms: u64,

    /// TTL for cached coefficient tables.
    pub coefficient_cache_ttl_ms: u64,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            max_source_rows: 10_000,
            rule_cache_ttl_ms: 5 * 60 * 1000,
            coefficient_cache_ttl_ms: 60 * 60 * 1000,
        }
    }
}

impl EnrichConfig {
    pub fn rule_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.rule_cache_ttl_ms)
    }

    pub fn coefficient_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.coefficient_cache_ttl_ms)
    }
}

impl EngineConfig {
    /// Parse a YAML document; missing sections and fields keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `COSTFLOW_CONTINUE_ON_ERROR`: `true`/`false`
    /// - `COSTFLOW_MAX_DURATION_MS`: run deadline in milliseconds
    /// - `COSTFLOW_CACHE_DEFAULT_TTL_MS`: default cache TTL
    /// - `COSTFLOW_CACHE_MAX_ENTRIES`: volatile cache capacity
    /// - `COSTFLOW_CACHE_SWEEP_INTERVAL_MS`: sweep interval (`0` disables)
    /// - `COSTFLOW_CACHE_DIR`: durable cache directory
    /// - `COSTFLOW_MAX_SOURCE_ROWS`: per-step source row ceiling
    /// - `COSTFLOW_RULE_CACHE_TTL_MS`, `COSTFLOW_COEFFICIENT_CACHE_TTL_MS`
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`EngineConfig::from_env`] over an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(s) = lookup("COSTFLOW_CONTINUE_ON_ERROR") {
            if let Ok(v) = s.trim().parse::<bool>() {
                cfg.pipeline.continue_on_error = v;
            }
        }

        if let Some(s) = lookup("COSTFLOW_MAX_DURATION_MS") {
            if let Ok(v) = s.trim().parse::<u64>() {
                cfg.pipeline.max_duration_ms = Some(v);
            }
        }

        if let Some(s) = lookup("COSTFLOW_CACHE_DEFAULT_TTL_MS") {
            if let Ok(v) = s.trim().parse::<u64>() {
                cfg.cache.default_ttl_ms = v;
            }
        }

        if let Some(s) = lookup("COSTFLOW_CACHE_MAX_ENTRIES") {
            if let Ok(v) = s.trim().parse::<usize>() {
                cfg.cache.max_entries = v;
            }
        }

        if let Some(s) = lookup("COSTFLOW_CACHE_SWEEP_INTERVAL_MS") {
            if let Ok(v) = s.trim().parse::<u64>() {
                cfg.cache.sweep_interval_ms = if v == 0 { None } else { Some(v) };
            }
        }

        if let Some(s) = lookup("COSTFLOW_CACHE_DIR") {
            cfg.cache.durable_dir = Some(s);
        }

        if let Some(s) = lookup("COSTFLOW_MAX_SOURCE_ROWS") {
            if let Ok(v) = s.trim().parse::<usize>() {
                cfg.enrich.max_source_rows = v;
            }
        }

        if let Some(s) = lookup("COSTFLOW_RULE_CACHE_TTL_MS") {
            if let Ok(v) = s.trim().parse::<u64>() {
                cfg.enrich.rule_cache_ttl_ms = v;
            }
        }

        if let Some(s) = lookup("COSTFLOW_COEFFICIENT_CACHE_TTL_MS") {
            if let Ok(v) = s.trim().parse::<u64>() {
                cfg.enrich.coefficient_cache_ttl_ms = v;
            }
        }

        cfg
    }
}

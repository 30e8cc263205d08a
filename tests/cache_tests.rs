//! Cache contract checks shared by both providers.

mod test_data_gen;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use costflow_cache::{CacheProvider, CacheProviderExt, DurableCache, VolatileCache};
use costflow_core::config::CacheConfig;
use serde_json::json;
use test_data_gen::temp_dir;

fn providers() -> Vec<(&'static str, Box<dyn CacheProvider>)> {
    vec![
        ("volatile", Box::new(VolatileCache::new(None, 100, None)) as Box<dyn CacheProvider>),
        ("durable-memory", Box::new(DurableCache::in_memory(None)) as Box<dyn CacheProvider>),
        ("durable-fs", Box::new(DurableCache::open(temp_dir("contract"), None)) as Box<dyn CacheProvider>),
    ]
}

#[test]
fn ttl_round_trip() {
    for (label, cache) in providers() {
        cache.set("k", json!({"v": 1}), Some(Duration::from_millis(50)));
        assert_eq!(cache.get("k"), Some(json!({"v": 1})), "{label}: fresh read");
        thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("k"), None, "{label}: expired read");
    }
}

#[test]
fn delete_and_clear_apply_to_every_provider() {
    for (label, cache) in providers() {
        cache.set("a", json!(1), None);
        cache.set("b", json!(2), None);
        cache.delete("a");
        assert_eq!(cache.get("a"), None, "{label}");
        assert_eq!(cache.get("b"), Some(json!(2)), "{label}");
        cache.clear();
        assert_eq!(cache.get("b"), None, "{label}");
    }
}

#[test]
fn typed_helpers_treat_undecodable_values_as_misses() {
    let cache = VolatileCache::new(None, 10, None);
    cache.set_as("nums", &vec![1u32, 2, 3], None).unwrap();
    assert_eq!(cache.get_as::<Vec<u32>>("nums"), Some(vec![1, 2, 3]));
    assert_eq!(cache.get_as::<String>("nums"), None);
}

#[test]
fn capacity_evicts_exactly_the_oldest_insert() {
    let max = 5;
    let cache = VolatileCache::new(None, max, None);
    for i in 0..max {
        cache.set(&format!("k{i}"), json!(i), None);
    }
    cache.set("overflow", json!("new"), None);

    assert_eq!(cache.get("k0"), None);
    for i in 1..max {
        assert_eq!(cache.get(&format!("k{i}")), Some(json!(i)));
    }
    assert_eq!(cache.get("overflow"), Some(json!("new")));
    assert_eq!(cache.len(), max);
}

#[test]
fn concurrent_writers_to_one_key_leave_one_value() {
    let cache = Arc::new(VolatileCache::new(None, 100, None));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let c = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..50 {
                    c.set("shared", json!(i), None);
                    c.set(&format!("own-{i}"), json!(i), None);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let v = cache.get("shared").and_then(|v| v.as_u64()).unwrap();
    assert!(v < 8);
    for i in 0..8u64 {
        assert_eq!(cache.get(&format!("own-{i}")), Some(json!(i)));
    }
}

#[test]
fn durable_cache_survives_reopen() {
    let dir = temp_dir("reopen");
    {
        let cache = DurableCache::open(&dir, None);
        assert!(cache.is_available());
        cache.set_with_category("rules:org-1", json!(["r1", "r2"]), None, "rules");
        cache.set("misc", json!(true), Some(Duration::from_millis(1)));
    }
    thread::sleep(Duration::from_millis(5));

    let cache = DurableCache::open(&dir, None);
    assert_eq!(cache.get("rules:org-1"), Some(json!(["r1", "r2"])));
    let stats = cache.stats();
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.by_category.get("rules"), Some(&1));

    assert_eq!(cache.cleanup(), 1);
    assert_eq!(cache.clear_by_type("rules"), 1);
    assert_eq!(cache.stats().total_entries, 0);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn durable_cache_on_unusable_path_is_a_no_op() {
    let dir = temp_dir("blocked");
    let file = dir.join("not-a-dir");
    std::fs::write(&file, b"occupied").unwrap();

    let cache = DurableCache::open(&file, None);
    assert!(!cache.is_available());
    cache.set("k", json!(1), None);
    assert_eq!(cache.get("k"), None);
    assert_eq!(cache.cleanup(), 0);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn caches_build_from_config() {
    let cfg = CacheConfig {
        default_ttl_ms: 0,
        max_entries: 2,
        sweep_interval_ms: None,
        durable_dir: None,
    };
    let volatile = VolatileCache::from_config(&cfg);
    assert_eq!(volatile.max_entries(), 2);
    assert!(!DurableCache::from_config(&cfg).is_available());

    let dir = temp_dir("from-config");
    let cfg = CacheConfig {
        durable_dir: Some(dir.to_string_lossy().into_owned()),
        ..cfg
    };
    assert!(DurableCache::from_config(&cfg).is_available());
    let _ = std::fs::remove_dir_all(dir);
}

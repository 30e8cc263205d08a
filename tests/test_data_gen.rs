//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use costflow_cache::VolatileCache;
use costflow_core::dataset::{DataFormat, RawDataset, SourceMetadata};
use costflow_core::types::Row;
use costflow_enrich::PipelineContext;
use costflow_query::MemoryEngine;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fresh, unique directory under the system temp dir.
pub fn temp_dir(tag: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "costflow-test-{tag}-{}-{n}-{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn billing_row(resource: &str, service: &str, region: &str, cost: f64) -> Row {
    Row::new()
        .with("ResourceId", resource)
        .with("ServiceName", service)
        .with("RegionId", region)
        .with("BilledCost", cost)
}

/// A small multi-cloud bill with AI, compute and storage lines.
pub fn sample_rows() -> Vec<Row> {
    vec![
        billing_row("i-0abc", "Amazon Elastic Compute Cloud", "us-east-1", 120.0)
            .with("AccountName", "prod-core")
            .with("InstanceType", "p4d.24xlarge"),
        billing_row("i-0abc", "Amazon Elastic Compute Cloud", "us-east-1", 80.0)
            .with("AccountName", "prod-core")
            .with("InstanceType", "p4d.24xlarge"),
        billing_row("bucket-logs", "Amazon Simple Storage Service", "us-east-1", 4.5)
            .with("AccountName", "prod-core")
            .with("ConsumedQuantity", 1500.0),
        billing_row("proj-chat", "OpenAI API", "global", 40.0)
            .with("AccountName", "dev-ml")
            .with("ResourceName", "gpt-4o"),
        billing_row("proj-embed", "OpenAI API", "global", 2.0)
            .with("AccountName", "dev-ml")
            .with("ResourceName", "text-embedding-3-small"),
        billing_row("vm-eu", "Virtual Machines", "westeurope", 33.0).with("AccountName", "prod-eu"),
    ]
}

pub fn sample_dataset() -> RawDataset {
    RawDataset::new(sample_rows(), SourceMetadata::new("multi", DataFormat::Csv))
}

/// Same shape as [`sample_rows`], repeated `n` times with distinct ids.
pub fn scaled_rows(n: usize) -> Vec<Row> {
    let base = sample_rows();
    (0..n)
        .flat_map(|i| {
            base.iter().map(move |r| {
                let mut row = r.clone();
                let id = row.text("ResourceId").unwrap_or_default();
                row.insert("ResourceId", format!("{id}-{i}"));
                row
            })
        })
        .collect()
}

pub fn memory_context() -> PipelineContext {
    PipelineContext::new(
        Arc::new(MemoryEngine::new()),
        Arc::new(VolatileCache::new(None, 256, None)),
    )
}

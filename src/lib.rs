#![forbid(unsafe_code)]
//! costflow: billing-record enrichment.
//!
//! A run threads a [`RawDataset`](model::dataset::RawDataset) through
//! dependency-ordered [`EnrichmentStep`](enrich::EnrichmentStep)s and returns
//! a [`PipelineResult`](exec::PipelineResult). This crate re-exports the
//! workspace members under short names.

pub use costflow_cache as cache;
pub use costflow_core as model;
pub use costflow_enrich as enrich;
pub use costflow_exec as exec;
pub use costflow_query as query;

pub mod prelude {
    pub use costflow_cache::{
        AggregationCache, CacheProvider, CacheProviderExt, DurableCache, VolatileCache,
    };
    pub use costflow_core::prelude::*;
    pub use costflow_enrich::{
        ClassificationStep, EmissionsStep, EnrichmentStep, PipelineContext, Rule, StepError,
        TagMergePolicy, TagOverlayStep,
    };
    pub use costflow_exec::{ExecError, Pipeline, PipelineResult};
    pub use costflow_query::{MemoryEngine, QueryEngine};
}

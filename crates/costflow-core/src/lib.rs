#![forbid(unsafe_code)]
//! costflow-core: shared data model for the enrichment pipeline.
//!
//! Holds the row/scalar model, raw and enriched datasets, the record types
//! produced by the built-in enrichment steps, run identifiers, configuration,
//! and stable hashing helpers. No query engine, cache, or step logic lives
//! here; higher crates build on these types.

pub mod config;
pub mod dataset;
pub mod enrichment;
pub mod error;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod types;

/// Crate version string recorded in run metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Convenient re-exports for downstream crates.

pub use crate::config::{CacheConfig, EngineConfig, EnrichConfig, PipelineConfig};
pub use crate::dataset::{DataFormat, EnrichedDataset, RawDataset, SchemaSummary, SourceMetadata};
pub use crate::enrichment::{EmissionEstimate, TagOverlay, WorkloadCategory, WorkloadClassification};
pub use crate::error::{Error, Result};
pub use crate::hash::Hash256;
pub use crate::id::RunId;
pub use crate::types::{Row, Scalar};

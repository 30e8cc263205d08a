//! The contract every enrichment step implements.

use costflow_core::dataset::EnrichedDataset;

use crate::context::{ContextField, PipelineContext};
use crate::error::StepError;

/// One named, independently testable unit of enrichment.
///
/// Invariants:
/// - `name` is stable and unique within one pipeline.
/// - `execute` never mutates its input; it returns a new dataset that keeps
///   every collection attached by earlier steps (only extending them).
/// - `validate` checks that the step's own output collection is present,
///   never that it is non-empty.
pub trait EnrichmentStep: Send + Sync {
    fn name(&self) -> &str;

    /// Names of steps that must run before this one.
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Context fields that must be set for `execute` to run.
    fn required_context(&self) -> &[ContextField] {
        &[]
    }

    fn execute(
        &self,
        input: &EnrichedDataset,
        ctx: &PipelineContext,
    ) -> Result<EnrichedDataset, StepError>;

    fn validate(&self, _output: &EnrichedDataset) -> bool {
        true
    }
}

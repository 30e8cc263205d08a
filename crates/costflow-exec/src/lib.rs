#![forbid(unsafe_code)]
//! costflow-exec: the pipeline orchestrator.
//!
//! Steps are registered by name, ordered by a depth-first topological sort
//! over their declared dependencies, and run strictly one at a time. Each
//! step yields an explicit result; the orchestrator folds those into a
//! [`PipelineResult`] according to the configured failure policy.

pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod result;

pub use error::{DependencyError, ExecError};
pub use orchestrator::Pipeline;
pub use result::{PipelineResult, RunMetadata, StepOutcome, StepStatus};

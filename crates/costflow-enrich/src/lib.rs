#![forbid(unsafe_code)]
//! costflow-enrich: the step contract and the built-in rule-based steps.
//!
//! - [`EnrichmentStep`] is the extension point the orchestrator drives.
//! - [`PipelineContext`] carries the run's collaborators (query engine,
//!   cache) and typed run attributes.
//! - Built-in steps: [`TagOverlayStep`] (virtual tags from priority-ordered
//!   rules), [`EmissionsStep`] (coefficient join with a cascading match) and
//!   [`ClassificationStep`] (regex pattern groups with a fixed threshold).

pub mod classification;
pub mod coefficients;
pub mod columns;
pub mod context;
pub mod emissions;
pub mod error;
pub mod merge;
pub mod rule;
pub mod source;
pub mod tagging;
pub mod traits;

pub use classification::{ClassificationRule, ClassificationStep, Classifier};
pub use coefficients::{Coefficient, CoefficientTable};
pub use columns::ColumnMap;
pub use context::{ContextField, PipelineContext, RunAttributes};
pub use emissions::EmissionsStep;
pub use error::StepError;
pub use merge::TagMergePolicy;
pub use rule::{Condition, ConditionValue, Operator, Rule};
pub use source::{CsvCoefficientSource, DefinitionSource, StaticSource, YamlFileSource};
pub use tagging::TagOverlayStep;
pub use traits::EnrichmentStep;

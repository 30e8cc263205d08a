//! What a run hands back to its caller.

use costflow_core::dataset::EnrichedDataset;
use costflow_core::id::RunId;
use serde::{Deserialize, Serialize};

use crate::error::ExecError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed { reason: String },
    NotRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub name: String,
    #[serde(flatten)]
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Metadata collected during a run, present on success and failure alike.
///
/// After a run that got as far as building its order, `steps_executed` and
/// `steps_skipped` partition that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: RunId,
    pub started_ms: u64,
    pub finished_ms: u64,
    pub duration_ms: u64,
    /// blake3 digest of the execution order; `None` if the build failed.
    pub order_digest: Option<String>,
    pub steps_executed: Vec<String>,
    pub steps_skipped: Vec<String>,
    pub warnings: Vec<String>,
    /// One entry per step of the order, in order.
    pub steps: Vec<StepOutcome>,
}

impl RunMetadata {
    pub fn new(run_id: RunId, started_ms: u64) -> Self {
        Self {
            run_id,
            started_ms,
            finished_ms: started_ms,
            duration_ms: 0,
            order_digest: None,
            steps_executed: Vec::new(),
            steps_skipped: Vec::new(),
            warnings: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|o| o.name == step)
    }
}

#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    pub data: Option<EnrichedDataset>,
    pub error: Option<String>,
    pub metadata: RunMetadata,
    #[serde(skip)]
    cause: Option<ExecError>,
}

impl PipelineResult {
    pub(crate) fn succeeded(data: EnrichedDataset, metadata: RunMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
            cause: None,
        }
    }

    pub(crate) fn failed(cause: ExecError, metadata: RunMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(cause.to_string()),
            metadata,
            cause: Some(cause),
        }
    }

    /// The typed error behind `error`, for failed runs.
    pub fn cause(&self) -> Option<&ExecError> {
        self.cause.as_ref()
    }

    /// Succeeded, but with at least one step skipped under continue-on-error.
    pub fn is_partial(&self) -> bool {
        self.success && !self.metadata.steps_skipped.is_empty()
    }

    pub fn into_data(self) -> Option<EnrichedDataset> {
        self.data
    }
}

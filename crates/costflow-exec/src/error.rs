use costflow_enrich::StepError;
use thiserror::Error;

/// Problems in the registered dependency graph. Always fatal, found before
/// any step runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("step '{step}' depends on unregistered step '{dependency}'")]
    Missing { step: String, dependency: String },

    #[error("dependency cycle detected at step '{step}'")]
    Cycle { step: String },
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("step '{step}' produced output that failed validation")]
    Validation { step: String },

    #[error("step '{step}' failed: {source}")]
    StepExecution {
        step: String,
        #[source]
        source: StepError,
    },

    #[error("run exceeded {limit_ms} ms (elapsed {elapsed_ms} ms) at step '{step}'")]
    Timeout {
        limit_ms: u64,
        elapsed_ms: u64,
        step: String,
    },
}

impl ExecError {
    /// The step the error is attributed to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            ExecError::Dependency(DependencyError::Missing { step, .. })
            | ExecError::Dependency(DependencyError::Cycle { step })
            | ExecError::Validation { step }
            | ExecError::StepExecution { step, .. }
            | ExecError::Timeout { step, .. } => Some(step.as_str()),
        }
    }
}

use costflow_cache::CacheError;
use costflow_query::QueryError;
use thiserror::Error;

use crate::context::ContextField;

/// Why a step failed. The orchestrator wraps this with the step's name.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("definition source '{origin}': {message}")]
    Source { origin: String, message: String },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("required context field '{0}' is not set")]
    MissingContext(ContextField),

    #[error("invalid definition: {0}")]
    Invalid(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StepError {
    pub fn source_failure(origin: impl Into<String>, message: impl ToString) -> Self {
        StepError::Source {
            origin: origin.into(),
            message: message.to_string(),
        }
    }
}

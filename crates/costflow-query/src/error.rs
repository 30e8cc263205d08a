use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unsupported query: {0}")]
    Unsupported(String),

    #[error("unknown view '{0}'")]
    UnknownView(String),

    #[error("unknown column '{column}' in view '{view}'")]
    UnknownColumn { view: String, column: String },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("engine error: {0}")]
    Engine(String),
}

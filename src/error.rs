//! Error types for the aggregation engine

use thiserror::Error;

/// Result type alias for aggregation engine operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Main error type for the aggregation engine
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed table or chunk configuration: wrong column counts,
    /// mismatched row counts, unsupported key/value layout.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An aggregator was fed a value whose type disagrees with its running type
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Operation invoked on an attribute type it does not support
    #[error("Internal error: {0}")]
    Internal(String),

    /// Point lookup miss
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

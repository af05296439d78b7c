//! Error types for the memory index.
//!
//! Only genuinely failing operations produce a [`MemIndexError`]. Mutations
//! after freeze, lookups in unknown or hidden fields and unsupported term kinds
//! are handled without raising an error.

use thiserror::Error;

/// The error type shared by all fallible operations in this crate.
#[derive(Error, Debug)]
pub enum MemIndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Feature store error: {0}")]
    FeatureStore(String),

    #[error("Invert task failed: {0}")]
    InvertFailed(String),

    #[error("Push task failed: {0}")]
    PushFailed(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Dump error: {0}")]
    Dump(String),

    #[error("{0}")]
    Other(String),
}

impl MemIndexError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        MemIndexError::InvalidArgument(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        MemIndexError::InvalidConfig(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        MemIndexError::Schema(msg.into())
    }

    pub fn feature_store(msg: impl Into<String>) -> Self {
        MemIndexError::FeatureStore(msg.into())
    }

    pub fn invert_failed(msg: impl Into<String>) -> Self {
        MemIndexError::InvertFailed(msg.into())
    }

    pub fn push_failed(msg: impl Into<String>) -> Self {
        MemIndexError::PushFailed(msg.into())
    }

    pub fn executor(msg: impl Into<String>) -> Self {
        MemIndexError::Executor(msg.into())
    }

    pub fn dump(msg: impl Into<String>) -> Self {
        MemIndexError::Dump(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        MemIndexError::Other(msg.into())
    }

    /// Returns true if the error was raised by an asynchronous invert or push task.
    pub fn is_task_failure(&self) -> bool {
        matches!(
            self,
            MemIndexError::InvertFailed(_) | MemIndexError::PushFailed(_)
        )
    }
}

/// Result type alias for memory index operations.
pub type Result<T> = std::result::Result<T, MemIndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MemIndexError::invalid_config("push_threads must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: push_threads must be > 0"
        );

        let err = MemIndexError::push_failed("field 'title'");
        assert_eq!(err.to_string(), "Push task failed: field 'title'");
    }

    #[test]
    fn test_task_failure_classification() {
        assert!(MemIndexError::invert_failed("x").is_task_failure());
        assert!(MemIndexError::push_failed("x").is_task_failure());
        assert!(!MemIndexError::schema("x").is_task_failure());
    }
}

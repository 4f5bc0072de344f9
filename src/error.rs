//! Error types for the Stackwise analysis pipeline
//!
//! This module provides the crate-wide error type using thiserror for
//! structured error definitions and anyhow for error propagation at the edges.
//! Configuration and scheduler errors live next to their modules
//! ([`crate::config::ConfigError`], [`crate::scheduler::SchedulerError`]).

use thiserror::Error;

/// Main error type for Stackwise operations
#[derive(Error, Debug)]
pub enum StackwiseError {
    /// Storage unreachable or query failed
    #[error("Data access error: {0}")]
    DataAccess(String),

    /// A record could not be used for analysis (e.g. out-of-range session scores)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A commit would violate a storage invariant (duplicate entity, stale checkpoint)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl StackwiseError {
    /// Whether the error came from the storage layer
    pub fn is_data_access(&self) -> bool {
        matches!(self, StackwiseError::DataAccess(_) | StackwiseError::Conflict(_))
    }
}

/// Result type alias for Stackwise operations
pub type Result<T> = std::result::Result<T, StackwiseError>;

/// Convert anyhow::Error to StackwiseError
impl From<anyhow::Error> for StackwiseError {
    fn from(err: anyhow::Error) -> Self {
        StackwiseError::Other(err.to_string())
    }
}

impl From<rusqlite::Error> for StackwiseError {
    fn from(err: rusqlite::Error) -> Self {
        StackwiseError::DataAccess(err.to_string())
    }
}

//! Error types for record stores

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the persistence layer behind the store traits
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind ("LogFile", "Task", "Depot")
        kind: &'static str,
        /// Identifier that failed to resolve
        id: u64,
    },
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: u64) -> Self {
        StoreError::NotFound { kind, id }
    }

    /// Whether the error means the record is simply missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

//! Error types for log collection runs

use logdepot_core::{LogType, StoreError};
use thiserror::Error;

/// Result type for collection operations
pub type CollectResult<T> = Result<T, CollectError>;

/// Errors that end a collection run
#[derive(Debug, Error)]
pub enum CollectError {
    /// Required settings are missing (e.g. no depot for the context)
    #[error("{0}")]
    Configuration(String),

    /// A referenced record does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Zipping or uploading one pattern failed
    #[error("Posting of {log_type} logs for pattern [{pattern}] failed: [{}] {source}", .source.class_name())]
    Collection {
        pattern: String,
        log_type: LogType,
        #[source]
        source: StepError,
    },

    /// Queue message arguments could not be encoded or decoded
    #[error("Invalid message arguments: {0}")]
    Arguments(#[from] serde_json::Error),

    /// Bookkeeping write failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CollectError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        CollectError::NotFound {
            resource: resource.into(),
        }
    }

    /// Whether the run ended because its deadline passed
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CollectError::Collection {
                source: StepError::Timeout,
                ..
            }
        )
    }
}

/// Failures inside the zip/upload step
#[derive(Debug, Error)]
pub enum StepError {
    /// None of the resolved patterns matched a file
    #[error("no files matched patterns {0:?}")]
    NothingMatched(Vec<String>),

    /// A pattern is not a valid glob
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Writing the archive failed
    #[error("archive error: {0}")]
    Archive(String),

    /// The depot rejected or failed the transfer
    #[error("upload error: {0}")]
    Upload(String),

    /// The run's deadline passed mid-step
    #[error("execution expired")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StepError {
    /// Short class name recorded alongside the message in logs
    pub fn class_name(&self) -> &'static str {
        match self {
            StepError::NothingMatched(_) => "NothingMatched",
            StepError::InvalidPattern { .. } => "InvalidPattern",
            StepError::Archive(_) => "ArchiveError",
            StepError::Upload(_) => "UploadError",
            StepError::Timeout => "Timeout",
            StepError::Io(_) => "IoError",
            StepError::Store(_) => "StoreError",
        }
    }
}

impl From<zip::result::ZipError> for StepError {
    fn from(e: zip::result::ZipError) -> Self {
        StepError::Archive(e.to_string())
    }
}

//! Error types for the coordinator

use std::fmt;
use std::time::Duration;
use tandem_blob::ObjectStoreError;
use tandem_common::ImportResult;
use tandem_guard::GuardError;
use tandem_records::RecordStoreError;
use thiserror::Error;

/// Resource manager taking part in an import transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    ObjectStore,
    RecordStore,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::ObjectStore => write!(f, "object store"),
            Resource::RecordStore => write!(f, "record store"),
        }
    }
}

/// Failure of a call into one of the store adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Object(#[from] ObjectStoreError),

    #[error(transparent)]
    Record(#[from] RecordStoreError),

    #[error("Adapter call did not complete within {0:?}")]
    Timeout(Duration),
}

impl AdapterError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Object(e) => e.is_retryable(),
            AdapterError::Record(e) => e.is_retryable(),
            AdapterError::Timeout(_) => true,
        }
    }
}

/// Coordinator error types
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Prepare phase failed on {resource}: {source}")]
    PrepareFailed {
        resource: Resource,
        #[source]
        source: AdapterError,
    },

    #[error("{resource} is not ready")]
    NotReady { resource: Resource },

    #[error("Commit failed: {source}")]
    CommitFailed {
        #[source]
        source: AdapterError,
    },

    #[error("Invalid transaction state: {0}")]
    IllegalState(String),

    #[error("Lock timeout: {0}")]
    LockTimeout(GuardError),

    #[error("Import rejected: {}", .result.error_message.as_deref().unwrap_or("no records imported"))]
    ImportRejected { result: ImportResult },
}

impl CoordinatorError {
    /// Map a failed record-store prepare call. Lock timeouts keep their own variant.
    pub(crate) fn record_prepare(source: AdapterError) -> Self {
        match source {
            AdapterError::Record(RecordStoreError::Lock(e)) => CoordinatorError::LockTimeout(e),
            source => CoordinatorError::PrepareFailed {
                resource: Resource::RecordStore,
                source,
            },
        }
    }

    /// Whether the caller may retry the whole import
    ///
    /// Retryable failures correspond to "service unavailable" for the outer
    /// caller; everything else is a data or programming error.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoordinatorError::PrepareFailed { source, .. }
            | CoordinatorError::CommitFailed { source } => source.is_retryable(),
            CoordinatorError::NotReady { .. } | CoordinatorError::LockTimeout(_) => true,
            CoordinatorError::IllegalState(_) | CoordinatorError::ImportRejected { .. } => false,
        }
    }
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;

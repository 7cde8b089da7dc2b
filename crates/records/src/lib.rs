//! Record store adapters
//!
//! An import is staged by [`RecordStore::execute_import`], which returns a
//! [`StagedImport`] holding an open transaction. Nothing staged is visible to
//! readers until the coordinator commits that transaction.

mod config;
mod reservation;
mod store;
mod transaction;

pub use config::RecordStoreConfig;
pub use store::FjallRecordStore;
pub use transaction::FjallImportTransaction;

use async_trait::async_trait;
use tandem_common::{CoordinateKey, ImportResult, Record, RecordId};
use tandem_guard::GuardError;
use thiserror::Error;

/// Record store errors
#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record with coordinates ({0}) already exists")]
    DuplicateCoordinates(CoordinateKey),

    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Lock error: {0}")]
    Lock(#[from] GuardError),

    #[error("Corrupt record data: {0}")]
    Corrupt(String),
}

impl RecordStoreError {
    /// Whether the same request may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecordStoreError::Unavailable(_)
                | RecordStoreError::Lock(_)
                | RecordStoreError::Storage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RecordStoreError>;

/// Open record-store transaction for one import attempt
#[async_trait]
pub trait RecordTransaction: Send {
    /// Number of records that become visible on commit
    fn staged_count(&self) -> usize;

    /// Make the staged records visible
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the staged records
    async fn rollback(self: Box<Self>);
}

/// Result of staging an import, plus the transaction that decides its fate
pub struct StagedImport {
    pub result: ImportResult,
    pub transaction: Box<dyn RecordTransaction>,
}

impl StagedImport {
    pub fn new(result: ImportResult, transaction: Box<dyn RecordTransaction>) -> Self {
        Self {
            result,
            transaction,
        }
    }
}

/// Transactional record storage as seen by the import coordinator
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Side-effect-free probe that the store can accept work
    async fn check_readiness(&self) -> bool;

    /// Validate and stage `records` inside a transaction that stays open
    ///
    /// Row-level rejections are reported in the returned [`ImportResult`];
    /// errors are reserved for the store itself failing.
    async fn execute_import(&self, records: Vec<Record>) -> Result<StagedImport>;
}

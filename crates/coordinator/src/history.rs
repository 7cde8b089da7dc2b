//! In-process log of import attempts

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tandem_common::{ImportResult, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Success,
    Failed,
}

/// One import attempt
#[derive(Debug, Clone, Serialize)]
pub struct ImportHistoryEntry {
    pub id: u64,
    pub status: ImportStatus,
    pub username: String,
    pub transaction_id: Option<TransactionId>,
    pub added_count: usize,
    pub total_processed: usize,
    pub failed_count: usize,
    pub error_message: Option<String>,
    /// Final key of the committed file
    pub object_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only list of import attempts, oldest first
#[derive(Debug, Default)]
pub struct ImportHistory {
    entries: RwLock<Vec<ImportHistoryEntry>>,
    next_id: AtomicU64,
}

impl ImportHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attempt built from its import result
    pub fn record(
        &self,
        username: &str,
        transaction_id: Option<TransactionId>,
        result: &ImportResult,
        object_key: Option<String>,
    ) -> ImportHistoryEntry {
        let status = if result.is_success() && object_key.is_some() {
            ImportStatus::Success
        } else {
            ImportStatus::Failed
        };
        let entry = ImportHistoryEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            status,
            username: username.to_string(),
            transaction_id,
            added_count: result.imported_count,
            total_processed: result.total_processed,
            failed_count: result.failed_count,
            error_message: result.error_message.clone(),
            object_key,
            created_at: Utc::now(),
        };
        self.entries.write().push(entry.clone());
        entry
    }

    pub fn entries(&self) -> Vec<ImportHistoryEntry> {
        self.entries.read().clone()
    }

    pub fn latest(&self) -> Option<ImportHistoryEntry> {
        self.entries.read().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

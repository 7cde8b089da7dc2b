//! End-to-end import of one uploaded file
//!
//! Drives prepare(object) -> prepare(record) -> commit on a
//! [`TwoPhaseCoordinator`] and calls the matching failure handler whenever a
//! step fails, so that a failed import leaves neither the file nor the
//! records visible.

use crate::coordinator::TwoPhaseCoordinator;
use crate::error::{CoordinatorError, Resource, Result};
use crate::history::ImportHistory;
use std::sync::Arc;
use tandem_common::{ImportResult, Record, TransactionId};

/// Uploaded file to be stored alongside its records
#[derive(Debug, Clone)]
pub struct ImportFile {
    pub content: Vec<u8>,
    pub content_type: String,
}

impl ImportFile {
    pub fn new(content: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            content,
            content_type: content_type.into(),
        }
    }

    pub fn json(content: Vec<u8>) -> Self {
        Self::new(content, "application/json")
    }

    /// JSON rendering of `records`, as the client would have uploaded it
    pub fn from_records(records: &[Record]) -> serde_json::Result<Self> {
        Ok(Self::json(serde_json::to_vec(records)?))
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Successful import
#[derive(Debug, Clone)]
pub struct ImportReceipt {
    pub transaction_id: TransactionId,
    pub final_object_key: String,
    pub result: ImportResult,
}

/// Import pipeline for one user
pub struct ImportWorkflow {
    coordinator: Arc<TwoPhaseCoordinator>,
    history: Arc<ImportHistory>,
    username: String,
}

impl ImportWorkflow {
    pub fn new(
        coordinator: Arc<TwoPhaseCoordinator>,
        history: Arc<ImportHistory>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            history,
            username: username.into(),
        }
    }

    pub fn coordinator(&self) -> &Arc<TwoPhaseCoordinator> {
        &self.coordinator
    }

    pub fn history(&self) -> &Arc<ImportHistory> {
        &self.history
    }

    /// Import `records` together with the file they were parsed from
    ///
    /// An empty import is rejected before anything is stored and is not
    /// recorded in the history. Every other attempt is.
    pub async fn run(&self, file: ImportFile, records: Vec<Record>) -> Result<ImportReceipt> {
        if records.is_empty() {
            return Err(CoordinatorError::ImportRejected {
                result: ImportResult::failure("No records provided", 0, 0, 0, vec![]),
            });
        }
        let total = records.len();
        tracing::info!("Importing {} records for {}", total, self.username);

        match self.execute(file, records).await {
            Ok(receipt) => {
                self.history.record(
                    &self.username,
                    Some(receipt.transaction_id.clone()),
                    &receipt.result,
                    Some(receipt.final_object_key.clone()),
                );
                tracing::info!(
                    "Import {} completed: {} records, file {}",
                    receipt.transaction_id,
                    receipt.result.imported_count,
                    receipt.final_object_key
                );
                Ok(receipt)
            }
            Err((transaction_id, err)) => {
                let result = match &err {
                    CoordinatorError::ImportRejected { result } => result.clone(),
                    other => ImportResult::failure(
                        format!("Import failed: {}", other),
                        total,
                        0,
                        total,
                        vec![],
                    ),
                };
                self.history
                    .record(&self.username, transaction_id, &result, None);
                tracing::error!("Import failed: {}", err);
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        file: ImportFile,
        records: Vec<Record>,
    ) -> std::result::Result<ImportReceipt, (Option<TransactionId>, CoordinatorError)> {
        let size = file.size();
        let transaction_id = self
            .coordinator
            .prepare_object_store(file.content, &file.content_type, size)
            .await
            .map_err(|e| (None, e))?;
        let failed = |e: CoordinatorError| (Some(transaction_id.clone()), e);

        let prepared = match self
            .coordinator
            .prepare_record_store(&transaction_id, records)
            .await
        {
            Ok(prepared) => prepared,
            Err(e) => {
                self.coordinator
                    .handle_record_store_failure(&transaction_id)
                    .await;
                return Err(failed(e));
            }
        };

        if !prepared.ready {
            self.coordinator
                .handle_record_store_failure(&transaction_id)
                .await;
            return Err(failed(CoordinatorError::NotReady {
                resource: Resource::RecordStore,
            }));
        }
        if !prepared.result.is_success() {
            self.coordinator
                .handle_business_logic_failure(&transaction_id)
                .await;
            return Err(failed(CoordinatorError::ImportRejected {
                result: prepared.result,
            }));
        }

        let final_object_key = self
            .coordinator
            .commit(&transaction_id)
            .await
            .map_err(failed)?;

        Ok(ImportReceipt {
            transaction_id,
            final_object_key,
            result: prepared.result,
        })
    }
}

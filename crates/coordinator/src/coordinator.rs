//! Core coordinator implementation

use crate::config::CoordinatorConfig;
use crate::error::{AdapterError, CoordinatorError, Resource, Result};
use crate::registry::{TakeError, TransactionRegistry};
use crate::transaction::TransactionState;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tandem_blob::ObjectStore;
use tandem_common::{ImportResult, Record, TransactionId, to_final};
use tandem_records::{RecordStore, RecordTransaction};

/// Outcome of preparing the record store
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPrepare {
    /// False when the readiness probe refused work; no import was attempted
    pub ready: bool,

    pub result: ImportResult,
}

impl RecordPrepare {
    /// Ready and every record staged
    pub fn is_prepared(&self) -> bool {
        self.ready && self.result.is_success()
    }
}

/// Two-phase commit coordinator over an object store and a record store
pub struct TwoPhaseCoordinator {
    object_store: Arc<dyn ObjectStore>,
    record_store: Arc<dyn RecordStore>,
    registry: Arc<TransactionRegistry>,
    config: CoordinatorConfig,
}

impl TwoPhaseCoordinator {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        record_store: Arc<dyn RecordStore>,
        registry: Arc<TransactionRegistry>,
    ) -> Self {
        Self::with_config(
            object_store,
            record_store,
            registry,
            CoordinatorConfig::default(),
        )
    }

    pub fn with_config(
        object_store: Arc<dyn ObjectStore>,
        record_store: Arc<dyn RecordStore>,
        registry: Arc<TransactionRegistry>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            object_store,
            record_store,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Copy of the state of an in-flight transaction
    pub fn transaction_state(&self, id: &TransactionId) -> Option<TransactionState> {
        self.registry.get(id)
    }

    /// Phase 1a: upload the file under a temporary key
    pub async fn prepare_object_store(
        &self,
        content: Vec<u8>,
        content_type: &str,
        size: u64,
    ) -> Result<TransactionId> {
        let id = TransactionId::generate();
        if !self
            .registry
            .insert_if_absent(TransactionState::new(id.clone()))
        {
            return Err(CoordinatorError::IllegalState(format!(
                "Transaction {} is already registered",
                id
            )));
        }
        tracing::info!("2PC Coordinator [BEGIN] - Transaction started: {}", id);

        let upload = self
            .object_store
            .upload_temporary(content, content_type, size);
        let temp_key = match call(self.config.adapter_timeout, upload).await {
            Ok(key) => key,
            Err(source) => {
                self.registry.remove(&id);
                if matches!(source, AdapterError::Timeout(_)) {
                    tracing::warn!(
                        "2PC Coordinator [PREPARE-FAIL] - Upload for {} timed out; a temporary blob may be left behind",
                        id
                    );
                }
                tracing::error!(
                    "2PC Coordinator [PREPARE-FAIL] - Object store failed for {}: {}",
                    id,
                    source
                );
                return Err(CoordinatorError::PrepareFailed {
                    resource: Resource::ObjectStore,
                    source,
                });
            }
        };

        let recorded = self
            .registry
            .with_entry(&id, |entry| entry.state.mark_object_prepared(temp_key.clone()));
        if recorded.is_none() {
            // Rolled back while the upload was running
            self.delete_best_effort(&temp_key).await;
            return Err(CoordinatorError::IllegalState(format!(
                "Transaction {} was rolled back during object store prepare",
                id
            )));
        }

        tracing::info!(
            "2PC Coordinator [PREPARE-OK] - Object store prepared: {} (temp key {})",
            id,
            temp_key
        );
        Ok(id)
    }

    /// Phase 1b: probe the record store and stage `records`
    ///
    /// The staged transaction stays open until [`commit`](Self::commit) or
    /// [`rollback`](Self::rollback). A result with failures leaves nothing
    /// staged and the transaction unprepared.
    pub async fn prepare_record_store(
        &self,
        id: &TransactionId,
        records: Vec<Record>,
    ) -> Result<RecordPrepare> {
        self.claim_record_prepare(id)?;

        let total = records.len();
        if !self.probe_readiness().await {
            self.release_record_prepare(id);
            tracing::warn!(
                "2PC Coordinator [PREPARE-FAIL] - Record store not ready for {}",
                id
            );
            return Ok(RecordPrepare {
                ready: false,
                result: ImportResult::failure("Record store is not ready", total, 0, 0, vec![]),
            });
        }

        let import = self.record_store.execute_import(records);
        let staged = match call(self.config.adapter_timeout, import).await {
            Ok(staged) => staged,
            Err(source) => {
                self.release_record_prepare(id);
                tracing::error!(
                    "2PC Coordinator [PREPARE-FAIL] - Record store failed for {}: {}",
                    id,
                    source
                );
                return Err(CoordinatorError::record_prepare(source));
            }
        };

        let result = staged.result;
        if !result.is_success() {
            self.discard_records(id, staged.transaction).await;
            self.release_record_prepare(id);
            tracing::warn!(
                "2PC Coordinator [PREPARE-FAIL] - Import rejected for {}: {} of {} records failed",
                id,
                result.failed_count,
                result.total_processed
            );
            return Ok(RecordPrepare {
                ready: true,
                result,
            });
        }

        if let Err(transaction) = self
            .registry
            .attach_record_transaction(id, staged.transaction)
        {
            self.discard_records(id, transaction).await;
            return Err(CoordinatorError::IllegalState(format!(
                "Transaction {} was rolled back during record store prepare",
                id
            )));
        }

        tracing::info!(
            "2PC Coordinator [PREPARE-OK] - Record store prepared: {} ({} records)",
            id,
            result.imported_count
        );
        Ok(RecordPrepare {
            ready: true,
            result,
        })
    }

    /// Phase 2: promote the blob, then commit the records
    ///
    /// Returns the final object key.
    pub async fn commit(&self, id: &TransactionId) -> Result<String> {
        let mut entry = match self.registry.take_prepared(id) {
            Ok(entry) => entry,
            Err(TakeError::NotFound) => {
                return Err(CoordinatorError::IllegalState(format!(
                    "Commit of unknown transaction {}",
                    id
                )));
            }
            Err(TakeError::NotPrepared(state)) => {
                return Err(CoordinatorError::IllegalState(format!(
                    "Commit of {} before both resources were prepared ({:?})",
                    id,
                    state.phase()
                )));
            }
        };
        let (Some(temp_key), Some(transaction)) = (
            entry.state.temp_object_key.clone(),
            entry.record_transaction.take(),
        ) else {
            return Err(CoordinatorError::IllegalState(format!(
                "Transaction {} is marked prepared without its resources",
                id
            )));
        };

        tracing::info!("2PC Coordinator [DECISION: COMMIT] - Committing transaction: {}", id);

        let promote = self.object_store.commit_object(&temp_key);
        let final_key = match call(self.config.adapter_timeout, promote).await {
            Ok(key) => key,
            Err(source) => {
                tracing::error!(
                    "2PC Coordinator [COMMIT-FAIL] - Object commit failed for {}: {}",
                    id,
                    source
                );
                self.discard_records(id, transaction).await;
                self.delete_best_effort(&temp_key).await;
                self.delete_best_effort(&to_final(&temp_key)).await;
                return Err(CoordinatorError::CommitFailed { source });
            }
        };

        if let Err(source) = call(self.config.adapter_timeout, transaction.commit()).await {
            tracing::error!(
                "2PC Coordinator [COMMIT-FAIL] - Record commit failed for {} after object {} was committed: {}",
                id,
                final_key,
                source
            );
            self.delete_best_effort(&final_key).await;
            return Err(CoordinatorError::CommitFailed { source });
        }

        tracing::info!(
            "2PC Coordinator [COMMIT-COMPLETE] - Transaction committed: {} (final key {})",
            id,
            final_key
        );
        Ok(final_key)
    }

    /// Abort `id`: delete its temporary blob and discard staged records
    ///
    /// Idempotent. Returns false when `id` is unknown or already finished.
    pub async fn rollback(&self, id: &TransactionId) -> bool {
        let Some(mut entry) = self.registry.remove(id) else {
            tracing::warn!("2PC Coordinator - Rollback of unknown transaction {}", id);
            return false;
        };
        tracing::info!("2PC Coordinator [DECISION: ROLLBACK] - Rolling back transaction: {}", id);

        if let Some(temp_key) = entry.state.temp_object_key.as_deref() {
            self.delete_best_effort(temp_key).await;
        }
        if let Some(transaction) = entry.record_transaction.take() {
            self.discard_records(id, transaction).await;
        }

        tracing::info!("2PC Coordinator [ROLLBACK-COMPLETE] - Transaction rolled back: {}", id);
        true
    }

    pub async fn handle_object_store_failure(&self, id: &TransactionId) -> bool {
        tracing::error!("Object store failure reported for transaction {}", id);
        self.rollback(id).await
    }

    pub async fn handle_record_store_failure(&self, id: &TransactionId) -> bool {
        tracing::error!("Record store failure reported for transaction {}", id);
        self.rollback(id).await
    }

    pub async fn handle_business_logic_failure(&self, id: &TransactionId) -> bool {
        tracing::warn!("Business logic failure reported for transaction {}", id);
        self.rollback(id).await
    }

    fn claim_record_prepare(&self, id: &TransactionId) -> Result<()> {
        let claimed = self.registry.with_entry(id, |entry| {
            if !entry.state.object_store_prepared {
                return Err("object store is not prepared");
            }
            if entry.state.record_store_prepared || entry.record_prepare_in_flight {
                return Err("record store is already prepared");
            }
            entry.record_prepare_in_flight = true;
            Ok(())
        });
        match claimed {
            Some(Ok(())) => Ok(()),
            Some(Err(reason)) => Err(CoordinatorError::IllegalState(format!(
                "Cannot prepare record store for {}: {}",
                id, reason
            ))),
            None => Err(CoordinatorError::IllegalState(format!(
                "Cannot prepare record store for unknown transaction {}",
                id
            ))),
        }
    }

    fn release_record_prepare(&self, id: &TransactionId) {
        self.registry
            .with_entry(id, |entry| entry.record_prepare_in_flight = false);
    }

    async fn probe_readiness(&self) -> bool {
        match tokio::time::timeout(
            self.config.readiness_timeout,
            self.record_store.check_readiness(),
        )
        .await
        {
            Ok(ready) => ready,
            Err(_) => {
                tracing::warn!(
                    "Record store readiness check timed out after {:?}",
                    self.config.readiness_timeout
                );
                false
            }
        }
    }

    /// Roll back a record-store transaction, bounded by the adapter timeout
    async fn discard_records(&self, id: &TransactionId, transaction: Box<dyn RecordTransaction>) {
        let discard = transaction.rollback();
        if tokio::time::timeout(self.config.adapter_timeout, discard)
            .await
            .is_err()
        {
            tracing::warn!("Record store rollback for {} timed out", id);
        }
    }

    async fn delete_best_effort(&self, key: &str) {
        let delete = self.object_store.delete_object(key);
        match call(self.config.adapter_timeout, delete).await {
            Ok(()) => tracing::debug!("Deleted object {}", key),
            Err(e) => tracing::warn!("Failed to delete object {}: {}", key, e),
        }
    }
}

/// Await an adapter call, treating expiry of `limit` as a failure
async fn call<T, E>(
    limit: Duration,
    fut: impl Future<Output = std::result::Result<T, E>>,
) -> std::result::Result<T, AdapterError>
where
    E: Into<AdapterError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(AdapterError::Timeout(limit)),
    }
}

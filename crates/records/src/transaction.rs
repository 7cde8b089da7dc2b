//! Staged import transaction

use crate::reservation::StageId;
use crate::store::StoreInner;
use crate::{RecordTransaction, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tandem_common::{Record, RecordId};

/// Open import transaction on a [`crate::FjallRecordStore`]
///
/// Holds the pending write batch and the coordinate reservations of its
/// stage. Dropping the transaction without committing discards the batch and
/// releases the reservations.
pub struct FjallImportTransaction {
    inner: Arc<StoreInner>,
    stage: StageId,
    batch: Option<fjall::Batch>,
    staged: Vec<RecordId>,
}

impl FjallImportTransaction {
    pub(crate) fn new(inner: Arc<StoreInner>, stage: StageId, batch: fjall::Batch) -> Self {
        Self {
            inner,
            stage,
            batch: Some(batch),
            staged: Vec::new(),
        }
    }

    /// Transaction with nothing to write
    pub(crate) fn empty(inner: Arc<StoreInner>, stage: StageId) -> Self {
        Self {
            inner,
            stage,
            batch: None,
            staged: Vec::new(),
        }
    }

    pub(crate) fn stage(&mut self, id: RecordId, record: &Record) -> Result<()> {
        let Some(batch) = self.batch.as_mut() else {
            return Ok(());
        };
        batch.insert(&self.inner.records, id.to_bytes(), serde_json::to_vec(record)?);
        if let Some(key) = record.coordinate_key() {
            batch.insert(&self.inner.coordinates, key.to_bytes(), id.to_bytes());
        }
        self.staged.push(id);
        Ok(())
    }

    pub(crate) fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Ids the staged records receive on commit
    pub fn staged_ids(&self) -> &[RecordId] {
        &self.staged
    }

    pub(crate) fn rollback_now(&mut self) {
        self.batch = None;
        self.staged.clear();
        self.inner.release_stage(self.stage);
    }
}

#[async_trait]
impl RecordTransaction for FjallImportTransaction {
    fn staged_count(&self) -> usize {
        self.staged.len()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        if let Some(batch) = this.batch.take() {
            batch.commit()?;
            this.inner.persist()?;
        }
        tracing::info!(
            "Import stage {} committed: {} records visible",
            this.stage,
            this.staged.len()
        );
        // Reservations are released on drop, after the index holds the keys
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        let mut this = self;
        let released = this.staged.len();
        this.rollback_now();
        tracing::info!(
            "Import stage {} rolled back: {} staged records discarded",
            this.stage,
            released
        );
    }
}

impl Drop for FjallImportTransaction {
    fn drop(&mut self) {
        self.inner.release_stage(self.stage);
    }
}

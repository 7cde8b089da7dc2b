//! Record store on a fjall keyspace
//!
//! Partitions:
//! - `records`: record id (8 bytes, big-endian) -> JSON record
//! - `coordinates`: coordinate key (12 bytes) -> record id
//!
//! Imports are staged into a `fjall::Batch` and applied atomically on
//! commit. Direct creates and updates commit their own single batch.

use crate::reservation::{ReservationTable, StageId};
use crate::transaction::FjallImportTransaction;
use crate::{RecordStore, RecordStoreConfig, RecordStoreError, Result, StagedImport};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tandem_common::{CoordinateKey, ImportResult, Record, RecordId};
use tandem_guard::CoordinateGuard;

pub(crate) struct StoreInner {
    keyspace: Keyspace,
    pub(crate) records: PartitionHandle,
    pub(crate) coordinates: PartitionHandle,
    persist_mode: PersistMode,
    next_id: AtomicU64,
    next_stage: AtomicU64,
    guard: CoordinateGuard,
    pub(crate) reservations: Mutex<ReservationTable>,
    available: AtomicBool,
}

impl StoreInner {
    pub(crate) fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub(crate) fn persist(&self) -> Result<()> {
        self.keyspace.persist(self.persist_mode)?;
        Ok(())
    }

    pub(crate) fn release_stage(&self, stage: StageId) -> usize {
        self.reservations.lock().release_stage(stage)
    }

    fn owner_of(&self, key: &CoordinateKey) -> Result<Option<RecordId>> {
        match self.coordinates.get(key.to_bytes())? {
            Some(value) => Ok(Some(decode_id(&value)?)),
            None => Ok(None),
        }
    }

    /// Fail unless `key` is neither reserved nor committed to another record
    ///
    /// Reservations are checked before the committed index. A stage writes
    /// its keys to the index before releasing them, so once no reservation
    /// is held the index read below is current.
    fn ensure_key_free(&self, key: &CoordinateKey, exclude: Option<RecordId>) -> Result<()> {
        if self.reservations.lock().is_reserved(key) {
            return Err(RecordStoreError::DuplicateCoordinates(*key));
        }
        if let Some(owner) = self.owner_of(key)?
            && Some(owner) != exclude
        {
            return Err(RecordStoreError::DuplicateCoordinates(*key));
        }
        Ok(())
    }
}

/// Record store backed by an on-disk fjall keyspace
#[derive(Clone)]
pub struct FjallRecordStore {
    inner: Arc<StoreInner>,
}

impl FjallRecordStore {
    /// Open (creating if needed) the keyspace at `config.path`
    ///
    /// Failure to open is reported as [`RecordStoreError::Unavailable`].
    pub fn open(config: &RecordStoreConfig) -> Result<Self> {
        let unavailable = |e: fjall::Error| {
            RecordStoreError::Unavailable(format!(
                "cannot open record store at {}: {}",
                config.path.display(),
                e
            ))
        };

        let keyspace = fjall::Config::new(&config.path)
            .open()
            .map_err(unavailable)?;
        let records = keyspace
            .open_partition("records", PartitionCreateOptions::default())
            .map_err(unavailable)?;
        let coordinates = keyspace
            .open_partition(
                "coordinates",
                PartitionCreateOptions::default().compression(fjall::CompressionType::None),
            )
            .map_err(unavailable)?;

        let max_id = match records.last_key_value()? {
            Some((key, _)) => decode_id(&key)?.0,
            None => 0,
        };

        tracing::info!(
            "Record store opened at {} (next id {})",
            config.path.display(),
            max_id + 1
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                keyspace,
                records,
                coordinates,
                persist_mode: config.persist_mode,
                next_id: AtomicU64::new(max_id + 1),
                next_stage: AtomicU64::new(1),
                guard: CoordinateGuard::with_config(config.guard.clone()),
                reservations: Mutex::new(ReservationTable::new()),
                available: AtomicBool::new(true),
            }),
        })
    }

    /// Take the store in or out of rotation
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    pub fn guard(&self) -> &CoordinateGuard {
        &self.inner.guard
    }

    /// Create one record under the coordinate lock
    ///
    /// Fails with [`RecordStoreError::DuplicateCoordinates`] if the key is
    /// committed or reserved by a staged import.
    pub async fn create_record(&self, record: Record) -> Result<RecordId> {
        self.ensure_available()?;
        tracing::info!("Creating new record: {}", record.name);

        let _lock = match record.coordinate_key() {
            Some(key) => {
                let lock = self.inner.guard.acquire(&key).await?;
                self.inner.ensure_key_free(&key, None)?;
                Some(lock)
            }
            None => None,
        };

        let id = self.allocate_id();
        let mut batch = self.inner.keyspace().batch();
        batch.insert(&self.inner.records, id.to_bytes(), serde_json::to_vec(&record)?);
        if let Some(key) = record.coordinate_key() {
            batch.insert(&self.inner.coordinates, key.to_bytes(), id.to_bytes());
        }
        batch.commit()?;
        self.inner.persist()?;

        tracing::info!("Successfully created record with ID: {}", id);
        Ok(id)
    }

    /// Replace record `id`, keeping coordinates unique among other records
    pub async fn update_record(&self, id: RecordId, record: Record) -> Result<()> {
        self.ensure_available()?;
        tracing::info!("Updating record with ID: {}", id);

        let new_key = record.coordinate_key();
        let _lock = match new_key {
            Some(key) => Some(self.inner.guard.acquire(&key).await?),
            None => None,
        };

        let existing = self.get(id)?.ok_or(RecordStoreError::NotFound(id))?;
        let old_key = existing.coordinate_key();

        if let Some(key) = new_key
            && new_key != old_key
        {
            self.inner.ensure_key_free(&key, Some(id))?;
        }

        let mut batch = self.inner.keyspace().batch();
        batch.insert(&self.inner.records, id.to_bytes(), serde_json::to_vec(&record)?);
        if old_key != new_key {
            if let Some(old) = old_key {
                batch.remove(&self.inner.coordinates, old.to_bytes());
            }
            if let Some(key) = new_key {
                batch.insert(&self.inner.coordinates, key.to_bytes(), id.to_bytes());
            }
        }
        batch.commit()?;
        self.inner.persist()?;
        Ok(())
    }

    pub fn get(&self, id: RecordId) -> Result<Option<Record>> {
        match self.inner.records.get(id.to_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Committed record holding `key`, if any
    pub fn find_by_coordinates(&self, key: &CoordinateKey) -> Result<Option<(RecordId, Record)>> {
        let Some(id) = self.inner.owner_of(key)? else {
            return Ok(None);
        };
        Ok(self.get(id)?.map(|record| (id, record)))
    }

    /// Number of committed records
    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.records.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.inner.records.is_empty()?)
    }

    /// Number of coordinate keys reserved by staged imports
    pub fn reserved_keys(&self) -> usize {
        self.inner.reservations.lock().len()
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.is_available() {
            return Err(RecordStoreError::Unavailable(
                "record store is out of rotation".to_string(),
            ));
        }
        Ok(())
    }

    fn allocate_id(&self) -> RecordId {
        RecordId(self.inner.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Row errors for coordinates repeated within one import file
    fn duplicate_rows(records: &[Record]) -> Vec<String> {
        let mut first_row: HashMap<CoordinateKey, usize> = HashMap::new();
        let mut errors = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let Some(key) = record.coordinate_key() else {
                continue;
            };
            let row = index + 1;
            match first_row.get(&key) {
                Some(first) => errors.push(format!(
                    "Row {}: coordinates ({}) duplicate row {} in the same import",
                    row, key, first
                )),
                None => {
                    first_row.insert(key, row);
                }
            }
        }
        errors
    }
}

#[async_trait]
impl RecordStore for FjallRecordStore {
    async fn check_readiness(&self) -> bool {
        if !self.is_available() {
            tracing::warn!("Record store readiness check: NOT READY (out of rotation)");
            return false;
        }
        // Read-only probe: nothing is written, so there is nothing to roll back
        match self.inner.records.first_key_value() {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Record store readiness check failed: {}", e);
                false
            }
        }
    }

    async fn execute_import(&self, records: Vec<Record>) -> Result<StagedImport> {
        self.ensure_available()?;

        let total = records.len();
        let stage = self.inner.next_stage.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Starting import of {} records (stage {})", total, stage);

        let duplicates = Self::duplicate_rows(&records);
        if !duplicates.is_empty() {
            let failed = duplicates.len();
            return Ok(StagedImport::new(
                ImportResult::failure(
                    "Validation failed - no objects imported",
                    total,
                    0,
                    failed,
                    duplicates,
                ),
                Box::new(FjallImportTransaction::empty(self.inner.clone(), stage)),
            ));
        }

        // From here on the transaction owns the stage, so every early return
        // releases its reservations when it drops.
        let mut transaction =
            FjallImportTransaction::new(self.inner.clone(), stage, self.inner.keyspace().batch());
        let mut errors = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let Some(key) = record.coordinate_key() else {
                continue;
            };
            let row = index + 1;

            let _lock = self.inner.guard.acquire(&key).await?;
            let reserved = self.inner.reservations.lock().reserve(stage, key);
            if let Err(owner) = reserved {
                errors.push(format!(
                    "Row {}: coordinates ({}) are reserved by a pending import (stage {})",
                    row, key, owner
                ));
                continue;
            }
            // Read only after reserving, see `ensure_key_free`
            if let Some(owner) = self.inner.owner_of(&key)? {
                errors.push(format!(
                    "Row {}: record with coordinates ({}) already exists (id {})",
                    row, key, owner
                ));
            }
        }

        if !errors.is_empty() {
            let failed = errors.len();
            tracing::warn!(
                "Import stage {} rejected: {} of {} rows failed",
                stage,
                failed,
                total
            );
            transaction.rollback_now();
            return Ok(StagedImport::new(
                ImportResult::failure(
                    "Validation failed - no objects imported",
                    total,
                    0,
                    failed,
                    errors,
                ),
                Box::new(transaction),
            ));
        }

        for record in &records {
            let id = self.allocate_id();
            transaction.stage(id, record)?;
        }

        tracing::info!(
            "Import stage {} prepared: {} records staged",
            stage,
            transaction.staged_len()
        );
        Ok(StagedImport::new(
            ImportResult::success(total, total),
            Box::new(transaction),
        ))
    }
}

pub(crate) fn decode_id(bytes: &[u8]) -> Result<RecordId> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| RecordStoreError::Corrupt(format!("record id of {} bytes", bytes.len())))?;
    Ok(RecordId::from_bytes(array))
}

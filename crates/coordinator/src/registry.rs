//! Transaction state registry
//!
//! One registry per process, constructed explicitly and shared by `Arc`. All
//! mutation happens under the registry's own mutex; callers only ever see
//! copies of a [`TransactionState`].

use crate::transaction::TransactionState;
use parking_lot::Mutex;
use std::collections::HashMap;
use tandem_common::TransactionId;
use tandem_records::RecordTransaction;

/// Registry slot for one transaction
pub struct RegistryEntry {
    pub(crate) state: TransactionState,

    /// Open record-store transaction, present once the record store is prepared
    pub(crate) record_transaction: Option<Box<dyn RecordTransaction>>,

    /// A record-store prepare call is running
    pub(crate) record_prepare_in_flight: bool,
}

impl RegistryEntry {
    fn new(state: TransactionState) -> Self {
        Self {
            state,
            record_transaction: None,
            record_prepare_in_flight: false,
        }
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }
}

/// Why an entry could not be taken for commit
#[derive(Debug)]
pub(crate) enum TakeError {
    NotFound,
    NotPrepared(TransactionState),
}

/// Concurrent map from transaction ID to transaction state
#[derive(Default)]
pub struct TransactionRegistry {
    entries: Mutex<HashMap<TransactionId, RegistryEntry>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new transaction. Returns false if the ID is already present.
    pub fn insert_if_absent(&self, state: TransactionState) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&state.transaction_id) {
            return false;
        }
        entries.insert(state.transaction_id.clone(), RegistryEntry::new(state));
        true
    }

    /// Copy of the current state of `id`
    pub fn get(&self, id: &TransactionId) -> Option<TransactionState> {
        self.entries.lock().get(id).map(|entry| entry.state.clone())
    }

    /// Remove `id`, handing its entry to the caller
    ///
    /// Dropping the returned entry drops any open record-store transaction.
    pub fn remove(&self, id: &TransactionId) -> Option<RegistryEntry> {
        self.entries.lock().remove(id)
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<TransactionId> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Run `f` on the entry for `id` while holding the registry lock
    pub(crate) fn with_entry<R>(
        &self,
        id: &TransactionId,
        f: impl FnOnce(&mut RegistryEntry) -> R,
    ) -> Option<R> {
        self.entries.lock().get_mut(id).map(f)
    }

    /// Attach a prepared record-store transaction to `id`
    ///
    /// Hands the transaction back if `id` is no longer registered.
    pub(crate) fn attach_record_transaction(
        &self,
        id: &TransactionId,
        transaction: Box<dyn RecordTransaction>,
    ) -> std::result::Result<(), Box<dyn RecordTransaction>> {
        let mut entries = self.entries.lock();
        match entries.get_mut(id) {
            Some(entry) => {
                entry.record_prepare_in_flight = false;
                entry.state.mark_record_prepared();
                entry.record_transaction = Some(transaction);
                Ok(())
            }
            None => Err(transaction),
        }
    }

    /// Remove `id` for commit if both resources are prepared
    ///
    /// An entry that is not fully prepared stays registered untouched.
    pub(crate) fn take_prepared(
        &self,
        id: &TransactionId,
    ) -> std::result::Result<RegistryEntry, TakeError> {
        let mut entries = self.entries.lock();
        let entry = entries.get(id).ok_or(TakeError::NotFound)?;
        if !entry.state.is_fully_prepared() || entry.record_prepare_in_flight {
            return Err(TakeError::NotPrepared(entry.state.clone()));
        }
        entries.remove(id).ok_or(TakeError::NotFound)
    }
}

//! Per-transaction bookkeeping

use serde::Serialize;
use tandem_common::TransactionId;

/// Phase of an import transaction
///
/// `Committed` and `RolledBack` are terminal; a transaction reaching either
/// is removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionPhase {
    /// Registered, blob upload not yet confirmed
    Started,
    /// Blob stored under its temporary key
    ObjectPrepared,
    /// Records staged in an open record-store transaction
    BothPrepared,
    Committed,
    RolledBack,
}

/// State of one in-flight import transaction
///
/// The prepared flags and `committed` only ever move from false to true.
/// A transaction leaves the registry as it commits, so registry copies never
/// show `committed` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionState {
    pub transaction_id: TransactionId,
    pub temp_object_key: Option<String>,
    pub object_store_prepared: bool,
    pub record_store_prepared: bool,
    pub committed: bool,
}

impl TransactionState {
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            temp_object_key: None,
            object_store_prepared: false,
            record_store_prepared: false,
            committed: false,
        }
    }

    pub fn phase(&self) -> TransactionPhase {
        if self.committed {
            TransactionPhase::Committed
        } else if self.object_store_prepared && self.record_store_prepared {
            TransactionPhase::BothPrepared
        } else if self.object_store_prepared {
            TransactionPhase::ObjectPrepared
        } else {
            TransactionPhase::Started
        }
    }

    /// Both resources reported ready
    pub fn is_fully_prepared(&self) -> bool {
        self.object_store_prepared && self.record_store_prepared
    }

    pub(crate) fn mark_object_prepared(&mut self, temp_key: String) {
        self.temp_object_key = Some(temp_key);
        self.object_store_prepared = true;
    }

    pub(crate) fn mark_record_prepared(&mut self) {
        self.record_store_prepared = true;
    }
}

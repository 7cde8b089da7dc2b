//! Coordinate reservations held by staged imports
//!
//! A staged import reserves every coordinate key it will insert. Until the
//! import commits or rolls back, no other import or create may claim those
//! keys, even though nothing is visible in the committed index yet.

use std::collections::{HashMap, HashSet};
use tandem_common::CoordinateKey;

/// Identifier of one staged import inside a store
pub(crate) type StageId = u64;

#[derive(Debug, Default)]
pub(crate) struct ReservationTable {
    /// Reserved key -> owning stage
    by_key: HashMap<CoordinateKey, StageId>,

    /// Keys owned by each stage
    by_stage: HashMap<StageId, HashSet<CoordinateKey>>,
}

impl ReservationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserve `key` for `stage`. Fails if another stage holds it.
    pub(crate) fn reserve(&mut self, stage: StageId, key: CoordinateKey) -> Result<(), StageId> {
        match self.by_key.get(&key) {
            Some(&owner) if owner != stage => Err(owner),
            Some(_) => Ok(()),
            None => {
                self.by_key.insert(key, stage);
                self.by_stage.entry(stage).or_default().insert(key);
                Ok(())
            }
        }
    }

    pub(crate) fn is_reserved(&self, key: &CoordinateKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Drop every reservation of `stage`, returning how many were held
    pub(crate) fn release_stage(&mut self, stage: StageId) -> usize {
        let Some(keys) = self.by_stage.remove(&stage) else {
            return 0;
        };
        for key in &keys {
            self.by_key.remove(key);
        }
        keys.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }
}

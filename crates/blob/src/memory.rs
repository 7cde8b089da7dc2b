//! In-memory object store with fault injection

use crate::{ObjectStore, ObjectStoreError, Result, StoredObject};
use crate::{check_size, validate_key};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use tandem_common::{generate_object_name, is_temporary, to_final, to_temporary};

/// Failure that can be injected into a [`MemoryObjectStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Every call fails with `Unavailable`
    Unavailable,
    /// `upload_temporary` fails
    Upload,
    /// `commit_object` fails before touching anything
    Commit,
    /// `commit_object` copies to the final key, then fails before removing
    /// the temporary copy
    CommitAfterCopy,
    /// `delete_object` fails
    Delete,
}

/// Object store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    faults: Mutex<HashSet<Fault>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a fault until [`clear_fault`](Self::clear_fault) is called
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().insert(fault);
    }

    pub fn clear_fault(&self, fault: Fault) {
        self.faults.lock().remove(&fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Store an object under an exact key, bypassing staging
    pub fn put(&self, key: &str, content: Vec<u8>, content_type: &str) {
        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                key: key.to_string(),
                content_type: content_type.to_string(),
                content,
            },
        );
    }

    fn check(&self, fault: Fault) -> Result<()> {
        let faults = self.faults.lock();
        if faults.contains(&Fault::Unavailable) {
            return Err(ObjectStoreError::Unavailable(
                "object store is not reachable".to_string(),
            ));
        }
        if faults.contains(&fault) {
            return Err(ObjectStoreError::Io(std::io::Error::other(format!(
                "injected {:?} failure",
                fault
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload_temporary(
        &self,
        content: Vec<u8>,
        content_type: &str,
        size: u64,
    ) -> Result<String> {
        self.check(Fault::Upload)?;
        check_size(&content, size)?;

        let temp_key = to_temporary(&generate_object_name());
        self.put(&temp_key, content, content_type);
        Ok(temp_key)
    }

    async fn commit_object(&self, temp_key: &str) -> Result<String> {
        self.check(Fault::Commit)?;
        validate_key(temp_key)?;
        if !is_temporary(temp_key) {
            return Ok(temp_key.to_string());
        }

        let final_key = to_final(temp_key);
        let partial = self.faults.lock().contains(&Fault::CommitAfterCopy);

        let mut objects = self.objects.lock();
        let mut object = objects
            .get(temp_key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(temp_key.to_string()))?;
        object.key = final_key.clone();
        objects.insert(final_key.clone(), object);

        if partial {
            return Err(ObjectStoreError::Io(std::io::Error::other(
                "injected failure removing temporary copy",
            )));
        }

        objects.remove(temp_key);
        Ok(final_key)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.check(Fault::Delete)?;
        self.objects.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check(Fault::Unavailable)?;
        Ok(self.objects.lock().contains_key(key))
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>> {
        self.check(Fault::Unavailable)?;
        Ok(self.objects.lock().get(key).cloned())
    }
}

//! Object store adapters
//!
//! The coordinator talks to blob storage only through [`ObjectStore`]. An
//! upload lands under a temporary key (see [`tandem_common::TEMP_PREFIX`]) and
//! becomes visible under its final key only once committed.

mod config;
mod fs;
mod memory;

pub use config::ObjectStoreConfig;
pub use fs::FsObjectStore;
pub use memory::{Fault, MemoryObjectStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Object store errors
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    #[error("Object store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Declared size {declared} does not match content length {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl ObjectStoreError {
    /// Connectivity failures may succeed on retry; data errors will not
    pub fn is_retryable(&self) -> bool {
        match self {
            ObjectStoreError::Unavailable(_) => true,
            ObjectStoreError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ObjectStoreError>;

/// A blob together with its content type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Blob storage as seen by the import coordinator
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `content` under a fresh temporary key and return that key
    async fn upload_temporary(
        &self,
        content: Vec<u8>,
        content_type: &str,
        size: u64,
    ) -> Result<String>;

    /// Make a temporary blob visible under its final key
    ///
    /// A key that is already final is returned unchanged.
    async fn commit_object(&self, temp_key: &str) -> Result<String>;

    /// Remove a blob. Removing an absent blob succeeds.
    async fn delete_object(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>>;
}

/// Reject empty, absolute and path-escaping keys
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let bad_component = key
        .split('/')
        .any(|part| part.is_empty() || part.starts_with('.'));
    if key.is_empty() || key.starts_with('/') || key.contains('\\') || bad_component {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub(crate) fn check_size(content: &[u8], size: u64) -> Result<()> {
    let actual = content.len() as u64;
    if actual != size {
        return Err(ObjectStoreError::SizeMismatch {
            declared: size,
            actual,
        });
    }
    Ok(())
}

//! Filesystem-backed object store
//!
//! Layout under `<root>/<bucket>`:
//! - `temp/<name>` and `<name>` hold blob content
//! - `.meta/<key>.json` holds the content type of each blob
//!
//! Commit is a rename within one bucket directory, so a blob appears under
//! its final key in one step.

use crate::{ObjectStore, ObjectStoreConfig, ObjectStoreError, Result, StoredObject};
use crate::{check_size, validate_key};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tandem_common::{generate_object_name, is_temporary, to_final, to_temporary};

const META_DIR: &str = ".meta";

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
    size: u64,
}

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    bucket_dir: PathBuf,
}

impl FsObjectStore {
    /// Open (creating if needed) the bucket directory
    ///
    /// Any failure here is reported as [`ObjectStoreError::Unavailable`].
    pub async fn open(config: &ObjectStoreConfig) -> Result<Self> {
        let bucket_dir = config.bucket_dir();
        tokio::fs::create_dir_all(bucket_dir.join(META_DIR))
            .await
            .map_err(|e| {
                ObjectStoreError::Unavailable(format!(
                    "cannot open bucket {}: {}",
                    bucket_dir.display(),
                    e
                ))
            })?;

        tracing::info!(
            "Object store initialized. Root: {}, Bucket: {}",
            config.root.display(),
            config.bucket
        );
        Ok(Self { bucket_dir })
    }

    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn content_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.bucket_dir.join(key))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.bucket_dir.join(META_DIR).join(format!("{}.json", key))
    }

    async fn write_object(&self, key: &str, content: &[u8], meta: &ObjectMeta) -> Result<()> {
        let path = self.content_path(key)?;
        let meta_path = self.meta_path(key);
        for p in [&path, &meta_path] {
            if let Some(parent) = p.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&path, content).await?;
        tokio::fs::write(&meta_path, serde_json::to_vec(meta)?).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload_temporary(
        &self,
        content: Vec<u8>,
        content_type: &str,
        size: u64,
    ) -> Result<String> {
        check_size(&content, size)?;
        let temp_key = to_temporary(&generate_object_name());

        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            size,
        };
        if let Err(e) = self.write_object(&temp_key, &content, &meta).await {
            // Leave nothing half-written behind
            if let Err(cleanup) = self.delete_object(&temp_key).await {
                tracing::warn!(
                    "Failed to clean up partial upload {}: {}",
                    temp_key,
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::info!("File uploaded with temporary key: {}", temp_key);
        Ok(temp_key)
    }

    async fn commit_object(&self, temp_key: &str) -> Result<String> {
        if !is_temporary(temp_key) {
            return Ok(temp_key.to_string());
        }

        let final_key = to_final(temp_key);
        let from = self.content_path(temp_key)?;
        let to = self.content_path(&final_key)?;

        if !tokio::fs::try_exists(&from).await? {
            return Err(ObjectStoreError::NotFound(temp_key.to_string()));
        }
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Content moves last; nothing is readable under the final key before it does
        let meta_to = self.meta_path(&final_key);
        if let Some(parent) = meta_to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::rename(self.meta_path(temp_key), &meta_to).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = tokio::fs::rename(&from, &to).await {
            tracing::debug!("Rename of {} failed ({}), falling back to copy", temp_key, e);
            tokio::fs::copy(&from, &to).await?;
            tokio::fs::remove_file(&from).await?;
        }

        tracing::info!("File committed from {} to {}", temp_key, final_key);
        Ok(final_key)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.content_path(key)?;
        for p in [path, self.meta_path(key)] {
            match tokio::fs::remove_file(&p).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!("Deleted object {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.content_path(key)?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>> {
        let path = self.content_path(key)?;
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let content_type = match tokio::fs::read(self.meta_path(key)).await {
            Ok(bytes) => serde_json::from_slice::<ObjectMeta>(&bytes)?.content_type,
            Err(e) if e.kind() == ErrorKind::NotFound => "application/octet-stream".to_string(),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(StoredObject {
            key: key.to_string(),
            content_type,
            content,
        }))
    }
}

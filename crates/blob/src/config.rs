//! Object store configuration

use std::path::PathBuf;

/// Location of the filesystem object store
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Directory holding all buckets
    pub root: PathBuf,

    /// Bucket (subdirectory) for import files
    pub bucket: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/objects"),
            bucket: "import-files".to_string(),
        }
    }
}

impl ObjectStoreConfig {
    /// Read `TANDEM_OBJECT_STORE_ROOT` and `TANDEM_OBJECT_STORE_BUCKET`,
    /// falling back to the defaults for unset or empty values
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let root = non_empty_env("TANDEM_OBJECT_STORE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.root);
        let bucket = non_empty_env("TANDEM_OBJECT_STORE_BUCKET").unwrap_or(defaults.bucket);
        Self { root, bucket }
    }

    pub fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

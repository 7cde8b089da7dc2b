//! Record store configuration

use fjall::PersistMode;
use std::path::PathBuf;
use tandem_guard::GuardConfig;

/// Configuration for [`crate::FjallRecordStore`]
#[derive(Debug, Clone)]
pub struct RecordStoreConfig {
    /// Keyspace directory
    pub path: PathBuf,

    /// Coordinate guard settings
    pub guard: GuardConfig,

    /// Durability applied after every commit
    pub persist_mode: PersistMode,
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/records"),
            guard: GuardConfig::default(),
            persist_mode: PersistMode::SyncData,
        }
    }
}

impl RecordStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Read `TANDEM_RECORD_STORE_PATH` and the guard settings from the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("TANDEM_RECORD_STORE_PATH")
            && !path.trim().is_empty()
        {
            config.path = PathBuf::from(path);
        }
        config.guard = GuardConfig::from_env();
        config
    }
}

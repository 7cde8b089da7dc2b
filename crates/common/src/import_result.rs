//! Outcome reported by the record store for one import attempt

use serde::{Deserialize, Serialize};

/// Counts and row errors for a batch import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub total_processed: usize,
    pub imported_count: usize,
    pub failed_count: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ImportResult {
    pub fn success(total_processed: usize, imported_count: usize) -> Self {
        Self {
            total_processed,
            imported_count,
            failed_count: 0,
            errors: Vec::new(),
            error_message: None,
        }
    }

    pub fn failure(
        message: impl Into<String>,
        total_processed: usize,
        imported_count: usize,
        failed_count: usize,
        errors: Vec<String>,
    ) -> Self {
        Self {
            total_processed,
            imported_count,
            failed_count,
            errors,
            error_message: Some(message.into()),
        }
    }

    /// An import succeeded only if no row failed and no aggregate error was reported
    pub fn is_success(&self) -> bool {
        self.failed_count == 0 && self.error_message.is_none()
    }
}

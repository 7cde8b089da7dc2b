//! Coordinator configuration

use std::time::Duration;

/// Timeouts applied to every adapter call
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound for uploads, imports, commits and deletes
    pub adapter_timeout: Duration,

    /// Upper bound for the record-store readiness probe
    pub readiness_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(30),
            readiness_timeout: Duration::from_secs(5),
        }
    }
}

impl CoordinatorConfig {
    /// Read `TANDEM_ADAPTER_TIMEOUT_MS` and `TANDEM_READINESS_TIMEOUT_MS`,
    /// keeping defaults for unset or unparsable values
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            adapter_timeout: millis_env("TANDEM_ADAPTER_TIMEOUT_MS")
                .unwrap_or(defaults.adapter_timeout),
            readiness_timeout: millis_env("TANDEM_READINESS_TIMEOUT_MS")
                .unwrap_or(defaults.readiness_timeout),
        }
    }
}

fn millis_env(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

//! Lock table keyed by uniqueness key
//!
//! Each key maps to its own `tokio::sync::Mutex`, which grants the lock in
//! FIFO order. Lock objects are created on first use under the table mutex,
//! so concurrent callers for a new key converge on the same instance.

use crate::{GuardError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tandem_common::CoordinateKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard configuration
#[derive(Debug, Clone, Default)]
pub struct GuardConfig {
    /// Maximum time to wait for a key. `None` waits until the lock is free.
    pub acquire_timeout: Option<Duration>,
}

impl GuardConfig {
    /// Read `TANDEM_LOCK_TIMEOUT_MS`; unset or unparsable means no timeout
    pub fn from_env() -> Self {
        let acquire_timeout = std::env::var("TANDEM_LOCK_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis);
        Self { acquire_timeout }
    }
}

/// Held lock on one key
///
/// The lock is released when the handle is dropped, so every exit path of
/// the critical section releases it.
pub struct LockHandle<K = CoordinateKey> {
    key: K,
    _guard: OwnedMutexGuard<()>,
}

impl<K> LockHandle<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Release the lock explicitly
    pub fn release(self) {
        drop(self);
    }
}

impl<K: fmt::Debug> fmt::Debug for LockHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle").field("key", &self.key).finish()
    }
}

/// In-process mutual exclusion keyed by uniqueness key
pub struct CoordinateGuard<K = CoordinateKey> {
    /// Lazily created per-key locks
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,

    config: GuardConfig,
}

impl<K> CoordinateGuard<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_config(GuardConfig::default())
    }

    pub fn with_config(config: GuardConfig) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Wait for the lock on `key`, honoring the configured timeout
    pub async fn acquire(&self, key: &K) -> Result<LockHandle<K>> {
        match self.config.acquire_timeout {
            Some(timeout) => self.acquire_timeout(key, timeout).await,
            None => Ok(self.acquire_unbounded(key).await),
        }
    }

    /// Wait at most `timeout` for the lock on `key`
    ///
    /// An expired waiter leaves the queue; the lock itself is unaffected.
    pub async fn acquire_timeout(&self, key: &K, timeout: Duration) -> Result<LockHandle<K>> {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.acquire_unbounded(key)).await {
            Ok(handle) => Ok(handle),
            Err(_) => {
                let waited = started.elapsed();
                tracing::warn!("Lock on {} not acquired within {:?}", key, waited);
                Err(GuardError::LockTimeout {
                    key: key.to_string(),
                    waited,
                })
            }
        }
    }

    /// Take the lock on `key` only if it is free right now
    pub fn try_acquire(&self, key: &K) -> Option<LockHandle<K>> {
        let lock = self.lock_for(key);
        lock.try_lock_owned().ok().map(|guard| LockHandle {
            key: key.clone(),
            _guard: guard,
        })
    }

    /// Whether someone currently holds the lock on `key`
    pub fn is_locked(&self, key: &K) -> bool {
        self.locks
            .lock()
            .get(key)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of holders plus waiters on `key`
    pub fn contenders(&self, key: &K) -> usize {
        self.locks
            .lock()
            .get(key)
            .map(|lock| Arc::strong_count(lock) - 1)
            .unwrap_or(0)
    }

    /// Number of lock objects currently in the table
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    /// Drop lock objects that are unlocked and have nobody queued
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_unused(&self) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        // Holders and waiters each own a clone; a count of one means only the table does.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        let removed = before - locks.len();
        if removed > 0 {
            tracing::debug!("Reclaimed {} unused coordinate locks", removed);
        }
        removed
    }

    async fn acquire_unbounded(&self, key: &K) -> LockHandle<K> {
        let lock = self.lock_for(key);
        let guard = lock.lock_owned().await;
        tracing::trace!("Acquired coordinate lock {}", key);
        LockHandle {
            key: key.clone(),
            _guard: guard,
        }
    }

    fn lock_for(&self, key: &K) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

impl<K> Default for CoordinateGuard<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

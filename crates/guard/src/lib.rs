//! Coordinate uniqueness guard
//!
//! Serializes concurrent create/update requests that share a uniqueness key,
//! so that the "key not in use" check and the following insert happen inside
//! one critical section per key.

mod guard;

pub use guard::{CoordinateGuard, GuardConfig, LockHandle};

use std::time::Duration;
use thiserror::Error;

/// Guard errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("Timed out after {waited:?} waiting for lock on {key}")]
    LockTimeout { key: String, waited: Duration },
}

pub type Result<T> = std::result::Result<T, GuardError>;

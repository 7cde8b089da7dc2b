//! Two-phase commit coordinator for imports
//!
//! An import spans two resources: the uploaded file goes to an object store
//! and the parsed records go to a transactional record store. The
//! coordinator prepares both, then commits the blob before the records so a
//! failed blob commit can still roll the records back.

mod config;
mod coordinator;
mod error;
mod history;
mod registry;
mod transaction;
mod workflow;

pub use config::CoordinatorConfig;
pub use coordinator::{RecordPrepare, TwoPhaseCoordinator};
pub use error::{AdapterError, CoordinatorError, Resource, Result};
pub use history::{ImportHistory, ImportHistoryEntry, ImportStatus};
pub use registry::{RegistryEntry, TransactionRegistry};
pub use transaction::{TransactionPhase, TransactionState};
pub use workflow::{ImportFile, ImportReceipt, ImportWorkflow};

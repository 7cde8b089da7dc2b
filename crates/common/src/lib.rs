//! Common types for the tandem import coordinator
//!
//! This crate defines:
//! - Transaction IDs (`txn_<millis>_<sequence>_<random>`)
//! - The temporary/final object key convention
//! - Records, their coordinates and the uniqueness key derived from them
//! - The import result reported by the record store

mod import_result;
mod object_key;
mod record;
mod transaction_id;

pub use import_result::ImportResult;
pub use object_key::{TEMP_PREFIX, generate_object_name, is_temporary, to_final, to_temporary};
pub use record::{CoordinateKey, Coordinates, Record, RecordId};
pub use transaction_id::TransactionId;

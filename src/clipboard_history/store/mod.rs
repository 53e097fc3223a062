//! Durable history persistence.
//!
//! - `sqlite` - primary store, one row per record with an explicit position
//! - `kv` - flat key-value store used as the fallback
//! - `payload` - versioned JSON encoding of the whole history
//! - `resilient` - composes primary + fallback with retry, merge and migration

mod kv;
mod payload;
mod resilient;
mod sqlite;

pub use kv::{JsonFileKv, KeyValueStore};
pub use payload::{decode_records, encode_records, DecodedPayload, PAYLOAD_VERSION};
pub use resilient::{
    merge_records, ResilienceOptions, ResilientStore, FALLBACK_ACTIVATED_AT_KEY,
    FALLBACK_ACTIVE_KEY, FALLBACK_RECORDS_KEY, LEGACY_HISTORY_KEY, MIGRATED_KEY,
};
pub use sqlite::SqliteStore;

use super::types::{ClipboardRecord, RecordId};
use crate::error::StoreError;

/// Ordered, durable collection of records.
///
/// Order is the aggregate's order: pinned records first, most recent first
/// within each partition.
pub trait HistoryStore: Send {
    /// Replace the stored collection with `records`.
    fn persist_all(&mut self, records: &[ClipboardRecord]) -> Result<(), StoreError>;

    /// Insert `record` at the front of its partition, or update it in place
    /// if its id is already stored.
    fn persist_one(&mut self, record: &ClipboardRecord) -> Result<(), StoreError>;

    fn load_all(&mut self) -> Result<Vec<ClipboardRecord>, StoreError>;

    /// Keep the `keep` most recent unpinned records; pinned ones are untouched.
    fn prune_oldest(&mut self, keep: usize) -> Result<(), StoreError>;

    fn delete_records(&mut self, ids: &[RecordId]) -> Result<(), StoreError>;

    /// True while writes are landing in a fallback instead of the primary.
    fn is_degraded(&self) -> bool {
        false
    }

    /// Move any pre-existing legacy history into this store. Returns the
    /// number of records migrated.
    fn migrate_legacy(&mut self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for Box<S> {
    fn persist_all(&mut self, records: &[ClipboardRecord]) -> Result<(), StoreError> {
        (**self).persist_all(records)
    }

    fn persist_one(&mut self, record: &ClipboardRecord) -> Result<(), StoreError> {
        (**self).persist_one(record)
    }

    fn load_all(&mut self) -> Result<Vec<ClipboardRecord>, StoreError> {
        (**self).load_all()
    }

    fn prune_oldest(&mut self, keep: usize) -> Result<(), StoreError> {
        (**self).prune_oldest(keep)
    }

    fn delete_records(&mut self, ids: &[RecordId]) -> Result<(), StoreError> {
        (**self).delete_records(ids)
    }

    fn is_degraded(&self) -> bool {
        (**self).is_degraded()
    }

    fn migrate_legacy(&mut self) -> Result<usize, StoreError> {
        (**self).migrate_legacy()
    }
}

//! Primary store composed with a key-value fallback.
//!
//! Any primary failure sends the whole collection to the fallback and raises
//! a persisted "fallback active" flag. The next successful primary load
//! merges the fallback records back and clears the flag.
//!
//! The store mirrors the last collection it loaded or wrote, so an
//! incremental edit that fails over still lands as a complete payload.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::kv::KeyValueStore;
use super::payload::{decode_records, encode_records};
use super::HistoryStore;
use crate::clipboard_history::types::{ClipboardRecord, RecordId};
use crate::error::StoreError;

pub const FALLBACK_RECORDS_KEY: &str = "history.fallback.records";
pub const FALLBACK_ACTIVE_KEY: &str = "history.fallback.active";
pub const FALLBACK_ACTIVATED_AT_KEY: &str = "history.fallback.activatedAt";
const FALLBACK_LAST_WRITE_KEY: &str = "history.fallback.lastWrite";
/// Where pre-database versions kept the whole history
pub const LEGACY_HISTORY_KEY: &str = "clipboardHistory";
pub const MIGRATED_KEY: &str = "history.migratedToPrimary";

static MIGRATION_LOCK: Mutex<()> = parking_lot::const_mutex(());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResilienceOptions {
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Minimum spacing between throttled full fallback writes
    pub fallback_throttle: Duration,
}

impl Default for ResilienceOptions {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay: Duration::from_millis(150),
            fallback_throttle: Duration::from_secs(60),
        }
    }
}

pub struct ResilientStore<P, K> {
    primary: P,
    fallback: K,
    options: ResilienceOptions,
    degraded: bool,
    /// Last full collection seen, with every later edit applied
    known: Option<Vec<ClipboardRecord>>,
    /// The last load did not come from the primary; its rows are not merged yet
    unmerged: bool,
}

/// Union of both lists by id (fallback wins), pinned first, newest first.
pub fn merge_records(
    primary: Vec<ClipboardRecord>,
    fallback: Vec<ClipboardRecord>,
) -> Vec<ClipboardRecord> {
    let mut by_id: HashMap<RecordId, ClipboardRecord> = HashMap::new();
    for record in primary.into_iter().chain(fallback) {
        by_id.insert(record.id, record);
    }
    let mut merged: Vec<ClipboardRecord> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
    merged
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl<P: HistoryStore, K: KeyValueStore> ResilientStore<P, K> {
    pub fn new(primary: P, fallback: K, options: ResilienceOptions) -> Self {
        let degraded = fallback.get_bool(FALLBACK_ACTIVE_KEY);
        if degraded {
            warn!("Clipboard history fallback storage is active from a previous run");
        }
        Self {
            primary,
            fallback,
            options,
            degraded,
            known: None,
            unmerged: false,
        }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn primary_mut(&mut self) -> &mut P {
        &mut self.primary
    }

    pub fn fallback(&self) -> &K {
        &self.fallback
    }

    /// Records currently held by the fallback payload.
    pub fn fallback_records(&self) -> Vec<ClipboardRecord> {
        match self.fallback.get(FALLBACK_RECORDS_KEY) {
            Ok(Some(bytes)) => decode_records(&bytes).into_records(),
            Ok(None) => Vec::new(),
            Err(e) => {
                error!(error = %e, "Failed to read fallback history payload");
                Vec::new()
            }
        }
    }

    /// Returns true when this failure starts a new degradation episode.
    fn activate_fallback(&mut self, cause: &StoreError) -> bool {
        let starting = !self.fallback.get_bool(FALLBACK_ACTIVE_KEY);
        if starting {
            warn!(error = %cause, "Primary history store failed, switching to fallback storage");
            let flagged = self
                .fallback
                .set_bool(FALLBACK_ACTIVE_KEY, true)
                .and_then(|_| self.fallback.set_i64(FALLBACK_ACTIVATED_AT_KEY, now_ms()));
            if let Err(e) = flagged {
                error!(error = %e, "Failed to record fallback-active flag");
            }
        } else {
            debug!(error = %cause, "Primary history store still failing");
        }
        self.degraded = true;
        starting
    }

    fn write_fallback(
        &mut self,
        records: &[ClipboardRecord],
        throttled: bool,
    ) -> Result<(), StoreError> {
        if throttled {
            if let Some(last) = self.fallback.get_i64(FALLBACK_LAST_WRITE_KEY) {
                let elapsed = now_ms().saturating_sub(last);
                if elapsed >= 0 && (elapsed as u128) < self.options.fallback_throttle.as_millis() {
                    debug!(elapsed_ms = elapsed, "Skipping throttled fallback write");
                    return Ok(());
                }
            }
        }
        let bytes = encode_records(records)?;
        self.fallback.set(FALLBACK_RECORDS_KEY, &bytes)?;
        self.fallback.set_i64(FALLBACK_LAST_WRITE_KEY, now_ms())?;
        debug!(count = records.len(), "Wrote history to fallback storage");
        Ok(())
    }

    fn clear_fallback(&mut self) -> Result<(), StoreError> {
        self.fallback.remove(FALLBACK_RECORDS_KEY)?;
        self.fallback.remove(FALLBACK_LAST_WRITE_KEY)?;
        self.fallback.remove(FALLBACK_ACTIVATED_AT_KEY)?;
        self.fallback.set_bool(FALLBACK_ACTIVE_KEY, false)?;
        self.degraded = false;
        info!("Primary history store recovered, fallback storage cleared");
        Ok(())
    }

    /// Apply an incremental edit to the mirrored collection. When the primary
    /// rejected it, write the edited collection to the fallback unthrottled.
    fn apply_edit(
        &mut self,
        primary: Result<(), StoreError>,
        edit: impl FnOnce(&mut Vec<ClipboardRecord>),
    ) -> Result<(), StoreError> {
        let primary_err = match primary {
            Ok(()) => {
                if let Some(known) = self.known.as_mut() {
                    edit(known);
                }
                return Ok(());
            }
            Err(e) => e,
        };

        self.activate_fallback(&primary_err);
        let mut records = match self.known.take() {
            Some(known) => known,
            None => self.fallback_records(),
        };
        edit(&mut records);
        let written = self.write_fallback(&records, false);
        self.known = Some(records);
        written.map_err(|fallback| StoreError::BothFailed {
            primary: Box::new(primary_err),
            fallback: Box::new(fallback),
        })
    }

    fn fail_over_full(
        &mut self,
        records: &[ClipboardRecord],
        primary_err: StoreError,
    ) -> Result<(), StoreError> {
        // the first write of an episode must not be skipped
        let starting = self.activate_fallback(&primary_err);
        self.known = Some(records.to_vec());
        self.write_fallback(records, !starting)
            .map_err(|fallback| StoreError::BothFailed {
                primary: Box::new(primary_err),
                fallback: Box::new(fallback),
            })
    }

    fn load_primary_with_retry(&mut self) -> Result<Vec<ClipboardRecord>, StoreError> {
        let attempts = self.options.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.primary.load_all() {
                Ok(records) => return Ok(records),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(attempt, error = %e, "Transient failure loading history, retrying");
                    thread::sleep(self.options.retry_delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<P: HistoryStore, K: KeyValueStore> HistoryStore for ResilientStore<P, K> {
    /// Replace the stored collection.
    ///
    /// After a load that could not read the primary, the primary's rows are
    /// merged in before anything overwrites them; if they still cannot be
    /// read, the write goes to the fallback only.
    fn persist_all(&mut self, records: &[ClipboardRecord]) -> Result<(), StoreError> {
        if self.unmerged {
            match self.load_primary_with_retry() {
                Ok(primary_rows) => {
                    let merged = merge_records(primary_rows, records.to_vec());
                    info!(
                        count = merged.len(),
                        "Merged primary rows into history loaded from fallback"
                    );
                    self.unmerged = false;
                    return self.persist_all(&merged);
                }
                Err(primary_err) => return self.fail_over_full(records, primary_err),
            }
        }

        match self.primary.persist_all(records) {
            Ok(()) => {
                self.known = Some(records.to_vec());
                if self.fallback.get_bool(FALLBACK_ACTIVE_KEY) {
                    self.clear_fallback()?;
                }
                Ok(())
            }
            Err(primary_err) => self.fail_over_full(records, primary_err),
        }
    }

    fn persist_one(&mut self, record: &ClipboardRecord) -> Result<(), StoreError> {
        let primary = self.primary.persist_one(record);
        self.apply_edit(primary, |records| {
            let slot = match records.iter().position(|r| r.id == record.id) {
                Some(at) if records[at].is_pinned == record.is_pinned => {
                    records[at] = record.clone();
                    return;
                }
                // pin flipped: partition boundary
                Some(at) => {
                    records.remove(at);
                    records.iter().take_while(|r| r.is_pinned).count()
                }
                None if record.is_pinned => 0,
                None => records.iter().take_while(|r| r.is_pinned).count(),
            };
            records.insert(slot, record.clone());
        })
    }

    fn load_all(&mut self) -> Result<Vec<ClipboardRecord>, StoreError> {
        let fallback_active = self.fallback.get_bool(FALLBACK_ACTIVE_KEY);
        match self.load_primary_with_retry() {
            Ok(records) if fallback_active => {
                let fallback = self.fallback_records();
                let merged = merge_records(records, fallback);
                self.known = Some(merged.clone());
                self.unmerged = false;
                match self.primary.persist_all(&merged) {
                    Ok(()) => {
                        info!(count = merged.len(), "Merged fallback history into primary store");
                        if let Err(e) = self.clear_fallback() {
                            error!(error = %e, "Failed to clear fallback storage after merge");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to write merged history, fallback stays active");
                    }
                }
                Ok(merged)
            }
            Ok(records) => {
                self.known = Some(records.clone());
                self.unmerged = false;
                Ok(records)
            }
            Err(primary_err) => {
                error!(error = %primary_err, "Failed to load history from primary store");
                self.activate_fallback(&primary_err);
                self.unmerged = true;
                match self.fallback.get(FALLBACK_RECORDS_KEY) {
                    Ok(Some(bytes)) => {
                        let records = decode_records(&bytes).into_records();
                        info!(count = records.len(), "Loaded history from fallback storage");
                        self.known = Some(records.clone());
                        Ok(records)
                    }
                    Ok(None) => Err(primary_err),
                    Err(fallback) => Err(StoreError::BothFailed {
                        primary: Box::new(primary_err),
                        fallback: Box::new(fallback),
                    }),
                }
            }
        }
    }

    fn prune_oldest(&mut self, keep: usize) -> Result<(), StoreError> {
        let primary = self.primary.prune_oldest(keep);
        self.apply_edit(primary, |records| {
            let mut unpinned_seen = 0;
            records.retain(|r| {
                if r.is_pinned {
                    return true;
                }
                unpinned_seen += 1;
                unpinned_seen <= keep
            });
        })
    }

    fn delete_records(&mut self, ids: &[RecordId]) -> Result<(), StoreError> {
        let primary = self.primary.delete_records(ids);
        self.apply_edit(primary, |records| records.retain(|r| !ids.contains(&r.id)))
    }

    fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Move the legacy flat history into the primary exactly once.
    ///
    /// The migrated flag is only set after the primary accepted the data, so
    /// a failed attempt is retried on the next start.
    fn migrate_legacy(&mut self) -> Result<usize, StoreError> {
        let _guard = MIGRATION_LOCK.lock();
        if self.fallback.get_bool(MIGRATED_KEY) {
            return Ok(0);
        }

        let migrated = match self.fallback.get(LEGACY_HISTORY_KEY)? {
            None => 0,
            Some(bytes) => {
                let legacy = decode_records(&bytes).into_records();
                let count = legacy.len();
                let existing = self.load_primary_with_retry()?;
                self.primary.persist_all(&merge_records(existing, legacy))?;
                self.fallback.remove(LEGACY_HISTORY_KEY)?;
                count
            }
        };

        self.fallback.set_bool(MIGRATED_KEY, true)?;
        if migrated > 0 {
            info!(count = migrated, "Migrated legacy clipboard history into primary store");
        }
        Ok(migrated)
    }
}

#[cfg(test)]
#[path = "resilient_tests.rs"]
mod tests;

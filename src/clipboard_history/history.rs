//! The canonical ordered history.
//!
//! Pure data structure; the engine owner thread is its only writer. Records
//! are kept partitioned as pinned ++ unpinned, most recent first within each
//! partition. Only the unpinned partition is bounded.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use super::hashing::{classify_insert, ContentDigest, DedupDecision};
use super::types::{ClipboardRecord, RecordId};

/// What an insert did, including every record that left the history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    pub decision: DedupDecision,
    /// Id of the committed record; `None` when the insert was skipped
    pub inserted: Option<RecordId>,
    /// Equivalent record the new one replaced
    pub replaced: Option<ClipboardRecord>,
    /// Oldest unpinned records dropped to honor the bound
    pub evicted: Vec<ClipboardRecord>,
}

impl InsertOutcome {
    pub fn removed(&self) -> impl Iterator<Item = &ClipboardRecord> {
        self.replaced.iter().chain(self.evicted.iter())
    }
}

#[derive(Debug, Clone)]
pub struct HistoryModel {
    records: Vec<ClipboardRecord>,
    image_index: HashMap<ContentDigest, RecordId>,
    max_unpinned: usize,
    revision: u64,
}

impl HistoryModel {
    pub fn new(max_unpinned: usize) -> Self {
        Self {
            records: Vec::new(),
            image_index: HashMap::new(),
            max_unpinned,
            revision: 0,
        }
    }

    /// Build a model from stored records, restoring every invariant.
    ///
    /// Returns the model and the records that had to be dropped: duplicates
    /// of a more recent record, and unpinned records beyond the bound.
    pub fn from_records(
        stored: Vec<ClipboardRecord>,
        max_unpinned: usize,
    ) -> (Self, Vec<ClipboardRecord>) {
        let mut model = Self::new(max_unpinned);
        let mut dropped = Vec::new();

        let (pinned, unpinned): (Vec<_>, Vec<_>) =
            stored.into_iter().partition(|record| record.is_pinned);
        for record in pinned.into_iter().chain(unpinned) {
            match classify_insert(&model.records, &model.image_index, &record) {
                DedupDecision::New => {
                    model.index(&record);
                    model.records.push(record);
                }
                DedupDecision::DuplicateReplace(_) | DedupDecision::DuplicateSkip => {
                    dropped.push(record)
                }
            }
        }

        dropped.extend(model.evict_overflow());
        (model, dropped)
    }

    pub fn records(&self) -> &[ClipboardRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pinned_len(&self) -> usize {
        self.records.iter().take_while(|r| r.is_pinned).count()
    }

    pub fn unpinned_len(&self) -> usize {
        self.records.len() - self.pinned_len()
    }

    pub fn max_unpinned(&self) -> usize {
        self.max_unpinned
    }

    /// Bumped on every committed change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, id: RecordId) -> Option<&ClipboardRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Record holding an image with this digest, if any
    pub fn find_image(&self, hash: &ContentDigest) -> Option<RecordId> {
        self.image_index.get(hash).copied()
    }

    /// Insert a record at the front of its partition.
    ///
    /// An equivalent record is replaced and its pin state carried over; a
    /// replacement of a pinned record goes to the front of the pinned
    /// partition. Eviction then trims the unpinned tail.
    pub fn insert(&mut self, mut record: ClipboardRecord) -> InsertOutcome {
        let decision = classify_insert(&self.records, &self.image_index, &record);
        let mut outcome = InsertOutcome {
            decision,
            inserted: None,
            replaced: None,
            evicted: Vec::new(),
        };

        let was_pinned = match decision {
            DedupDecision::DuplicateSkip => return outcome,
            DedupDecision::DuplicateReplace(old_id) => {
                let old = self.take(old_id);
                let was_pinned = old.as_ref().is_some_and(|r| r.is_pinned);
                outcome.replaced = old;
                was_pinned
            }
            DedupDecision::New => false,
        };
        record.is_pinned = was_pinned;

        let slot = if record.is_pinned { 0 } else { self.pinned_len() };
        outcome.inserted = Some(record.id);
        self.index(&record);
        self.records.insert(slot, record);

        outcome.evicted = self.evict_overflow();
        self.revision += 1;
        outcome
    }

    /// Flip a record's pin state and move it to the partition boundary.
    ///
    /// Returns the new pin state, or `None` if the id is unknown. Unpinning
    /// never evicts; the bound is applied on the next insert.
    pub fn toggle_pin(&mut self, id: RecordId) -> Option<bool> {
        let mut record = self.take(id)?;
        record.is_pinned = !record.is_pinned;
        let pinned = record.is_pinned;

        // boundary: end of pinned when pinning, start of unpinned when unpinning
        let boundary = self.pinned_len();
        self.index(&record);
        self.records.insert(boundary, record);
        self.revision += 1;
        Some(pinned)
    }

    pub fn delete(&mut self, id: RecordId) -> Option<ClipboardRecord> {
        let removed = self.take(id)?;
        self.revision += 1;
        Some(removed)
    }

    /// Remove everything, or only the unpinned partition.
    pub fn clear(&mut self, keep_pinned: bool) -> Vec<ClipboardRecord> {
        let split = if keep_pinned { self.pinned_len() } else { 0 };
        let removed: Vec<ClipboardRecord> = self.records.drain(split..).collect();
        for record in &removed {
            self.unindex(record);
        }
        if !removed.is_empty() {
            self.revision += 1;
        }
        removed
    }

    /// Fold in stored records this model does not hold.
    ///
    /// Held records keep their place and win over equivalent stored ones;
    /// the stored ones follow within each partition, newest first. Returns
    /// the records dropped as duplicates or to honor the bound.
    pub fn absorb(&mut self, stored: Vec<ClipboardRecord>) -> Vec<ClipboardRecord> {
        let mut missing: Vec<ClipboardRecord> = stored
            .into_iter()
            .filter(|record| self.get(record.id).is_none())
            .collect();
        if missing.is_empty() {
            return Vec::new();
        }
        missing.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });

        let before: Vec<RecordId> = self.records.iter().map(|r| r.id).collect();
        let mut combined = std::mem::take(&mut self.records);
        combined.extend(missing);
        let revision = self.revision;
        let (rebuilt, dropped) = Self::from_records(combined, self.max_unpinned);
        *self = rebuilt;
        let changed = !self.records.iter().map(|r| r.id).eq(before.iter().copied());
        self.revision = revision + u64::from(changed);
        dropped
    }

    /// All asset paths referenced by the current records
    pub fn referenced_asset_paths(&self) -> HashSet<PathBuf> {
        self.records
            .iter()
            .flat_map(|r| r.asset_paths())
            .map(|p| p.to_path_buf())
            .collect()
    }

    fn take(&mut self, id: RecordId) -> Option<ClipboardRecord> {
        let position = self.records.iter().position(|r| r.id == id)?;
        let record = self.records.remove(position);
        self.unindex(&record);
        Some(record)
    }

    fn evict_overflow(&mut self) -> Vec<ClipboardRecord> {
        let limit = self.pinned_len() + self.max_unpinned;
        if self.records.len() <= limit {
            return Vec::new();
        }
        let evicted: Vec<ClipboardRecord> = self.records.drain(limit..).collect();
        for record in &evicted {
            self.unindex(record);
        }
        evicted
    }

    fn index(&mut self, record: &ClipboardRecord) {
        if let Some(hash) = &record.image_hash {
            self.image_index.insert(hash.clone(), record.id);
        }
    }

    fn unindex(&mut self, record: &ClipboardRecord) {
        if let Some(hash) = &record.image_hash {
            if self.image_index.get(hash) == Some(&record.id) {
                self.image_index.remove(hash);
            }
        }
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;

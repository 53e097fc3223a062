//! Content hashing and duplicate classification.
//!
//! Digests are SHA-256 so they stay stable across process runs. Text
//! duplicates are decided by full string equality; the text digest is only a
//! pre-filter used by the change monitor.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use super::types::{ClipboardRecord, RecordId};

/// Lowercase hex SHA-256 of some clipboard content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Accept a stored digest; anything that is not 64 hex chars is rejected.
    pub fn from_hex(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(value.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn hash_bytes(bytes: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentDigest(hex::encode(hasher.finalize()))
}

pub fn hash_text(text: &str) -> ContentDigest {
    hash_bytes(text.as_bytes())
}

/// What inserting a candidate record would do to the history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// No equivalent record exists
    New,
    /// An equivalent record exists and is replaced by the candidate
    DuplicateReplace(RecordId),
    /// The candidate itself is already present
    DuplicateSkip,
}

/// Decide how `candidate` relates to the existing records.
///
/// Images are matched through `image_index`; text records by resolved text
/// against non-image records only.
pub fn classify_insert(
    records: &[ClipboardRecord],
    image_index: &HashMap<ContentDigest, RecordId>,
    candidate: &ClipboardRecord,
) -> DedupDecision {
    if records.iter().any(|record| record.id == candidate.id) {
        return DedupDecision::DuplicateSkip;
    }

    if candidate.is_image() {
        return match candidate
            .image_hash
            .as_ref()
            .and_then(|hash| image_index.get(hash))
        {
            Some(existing) => DedupDecision::DuplicateReplace(*existing),
            None => DedupDecision::New,
        };
    }

    let text = candidate.resolved_text();
    records
        .iter()
        .find(|record| !record.is_image() && record.resolved_text() == text)
        .map_or(DedupDecision::New, |record| {
            DedupDecision::DuplicateReplace(record.id)
        })
}

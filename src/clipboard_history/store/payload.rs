//! Versioned JSON encoding of a whole history
//!
//! Current shape: `{"version": 2, "records": [...]}`. Older installs wrote a
//! bare array of `{text, timestamp (seconds), isPinned, imagePath}`.
//! Decoding tries the current shape, then the legacy one, and otherwise
//! discards the payload.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

use crate::clipboard_history::types::{
    next_timestamp_ms, ClipboardRecord, RecordId, IMAGE_PREVIEW,
};
use crate::error::StoreError;

pub const PAYLOAD_VERSION: u32 = 2;

#[derive(Serialize)]
struct PayloadRef<'a> {
    version: u32,
    records: &'a [ClipboardRecord],
}

#[derive(Deserialize)]
struct Payload {
    version: u32,
    records: Vec<ClipboardRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    #[serde(default)]
    id: Option<String>,
    text: String,
    /// Seconds since the Unix epoch
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    is_pinned: bool,
    #[serde(default)]
    image_path: Option<String>,
}

impl LegacyRecord {
    fn into_record(self) -> ClipboardRecord {
        let mut record = if self.image_path.is_some() {
            let mut record = ClipboardRecord::text(IMAGE_PREVIEW, false);
            record.image_path = self.image_path.map(PathBuf::from);
            record
        } else {
            ClipboardRecord::text(&self.text, false)
        };

        if let Some(id) = self.id.as_deref().and_then(RecordId::parse) {
            record.id = id;
        }
        record.timestamp = match self.timestamp {
            Some(seconds) if seconds.is_finite() && seconds > 0.0 => (seconds * 1000.0) as i64,
            _ => next_timestamp_ms(),
        };
        record.is_pinned = self.is_pinned;
        record
    }
}

/// Which tier a payload was decoded with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPayload {
    Current(Vec<ClipboardRecord>),
    Legacy(Vec<ClipboardRecord>),
    Discarded,
}

impl DecodedPayload {
    pub fn into_records(self) -> Vec<ClipboardRecord> {
        match self {
            DecodedPayload::Current(records) | DecodedPayload::Legacy(records) => records,
            DecodedPayload::Discarded => Vec::new(),
        }
    }
}

pub fn encode_records(records: &[ClipboardRecord]) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(&PayloadRef {
        version: PAYLOAD_VERSION,
        records,
    })
    .map_err(StoreError::Encode)
}

fn decode_current(bytes: &[u8]) -> Result<Vec<ClipboardRecord>, StoreError> {
    let payload: Payload =
        serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    if payload.version != PAYLOAD_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported payload version {}",
            payload.version
        )));
    }
    Ok(payload.records)
}

fn decode_legacy(bytes: &[u8]) -> Result<Vec<ClipboardRecord>, StoreError> {
    let legacy: Vec<LegacyRecord> =
        serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(legacy.into_iter().map(LegacyRecord::into_record).collect())
}

pub fn decode_records(bytes: &[u8]) -> DecodedPayload {
    let current_err = match decode_current(bytes) {
        Ok(records) => return DecodedPayload::Current(records),
        Err(e) => e,
    };
    match decode_legacy(bytes) {
        Ok(records) => {
            info!(count = records.len(), "Decoded legacy history payload");
            DecodedPayload::Legacy(records)
        }
        Err(legacy_err) => {
            error!(
                current_error = %current_err,
                legacy_error = %legacy_err,
                size = bytes.len(),
                "Discarding undecodable history payload"
            );
            DecodedPayload::Discarded
        }
    }
}

//! Clipboard History Module
//!
//! Captures pasteboard changes into a deduplicated, pin-aware, size-bounded
//! history that survives restarts.
//!
//! ## Features
//! - Polls the pasteboard change counter (500ms by default)
//! - Text, rich text (RTF/HTML files) and images (PNG files)
//! - SHA-256 content deduplication; re-copying keeps the pin
//! - Pinned records are exempt from the history bound
//! - SQLite primary store with a key-value fallback file
//! - Periodic collection of orphaned asset files
//! - Search, filters and time grouping (Today, Yesterday, This Week, etc.)
//!
//! ## Module Structure
//! - `types`: Core types (ClipboardRecord, RecordId, ContentKind, AssetKind)
//! - `hashing`: Content digests and the insert dedup decision
//! - `pasteboard`: Pasteboard capability and the system implementation
//! - `change_detection`: NSPasteboard changeCount access
//! - `capture`: Pasteboard snapshot into a provisional record
//! - `asset_store`: Loose asset files and orphan reconciliation
//! - `store`: Persistence (SQLite, fallback, payload codec, migration)
//! - `history`: In-memory ordered history
//! - `monitor`: Per-poll change detection and timers
//! - `gc`: Orphaned asset collection schedule
//! - `engine`: Owner thread and the `ClipboardHistory` handle
//! - `query`: Search and time grouping

mod asset_store;
mod capture;
mod change_detection;
mod engine;
mod gc;
mod hashing;
mod history;
mod monitor;
mod pasteboard;
mod query;
pub mod store;
mod types;

#[cfg(test)]
pub(crate) mod testing;

// Types
pub use types::{
    bound_text, AssetKind, ClipboardRecord, ContentKind, RecordId, FULL_TEXT_CAP_BYTES,
    IMAGE_PREVIEW, MAX_PREVIEW_CHARS,
};

// Hashing
pub use hashing::{classify_insert, hash_bytes, hash_text, ContentDigest, DedupDecision};

// Pasteboard
pub use pasteboard::{Pasteboard, PasteboardKind, PasteboardWrite, RichData, SystemPasteboard};

// Capture
pub use capture::{capture_current_content, is_sensitive, CapturedContent, PendingAssets};

// Assets
pub use asset_store::{AssetStore, GcReport};

// Persistence
pub use store::{
    HistoryStore, JsonFileKv, KeyValueStore, ResilienceOptions, ResilientStore, SqliteStore,
};

// History
pub use history::{HistoryModel, InsertOutcome};

// Monitor
pub use monitor::{ChangeMonitor, PollResult, RejectReason, TickOutcome};

// Engine
pub use engine::{ClipboardHistory, EngineWarning, HistoryEvent};

// Query
pub use query::{
    classify_timestamp, classify_timestamp_with_now, group_by_time, HistoryQuery, TimeGroup,
};

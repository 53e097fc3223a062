//! Record types shared by every stage of the clipboard pipeline.
//!
//! A record starts out provisional (built by capture, no asset paths),
//! picks up asset paths on a background worker, and is then handed to the
//! history owner for insertion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

use super::hashing::ContentDigest;

/// Maximum number of characters kept in `preview_text`
pub const MAX_PREVIEW_CHARS: usize = 200;

/// Texts above this size (bytes) keep only their preview
pub const FULL_TEXT_CAP_BYTES: usize = 1_000_000;

/// Preview shown for image records
pub const IMAGE_PREVIEW: &str = "Image";

/// Opaque record identifier, assigned once at capture and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a record holds, derived from which payloads are attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    RichText,
    Image,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::RichText => "rich",
            ContentKind::Image => "image",
        }
    }
}

/// Kind of heavy payload kept as a loose file in the asset directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Rtf,
    Html,
    Image,
}

impl AssetKind {
    pub fn extension(&self) -> &'static str {
        match self {
            AssetKind::Rtf => "rtf",
            AssetKind::Html => "html",
            AssetKind::Image => "png",
        }
    }
}

/// One captured clipboard event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardRecord {
    pub id: RecordId,
    pub preview_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_text_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<ContentDigest>,
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_sensitive: bool,
}

impl ClipboardRecord {
    /// Build a provisional text record, applying the preview and full-text bounds.
    pub fn text(text: &str, is_sensitive: bool) -> Self {
        let (preview_text, full_text) = bound_text(text);
        Self {
            id: RecordId::new(),
            preview_text,
            full_text,
            rich_text_path: None,
            html_path: None,
            image_path: None,
            image_hash: None,
            timestamp: next_timestamp_ms(),
            is_pinned: false,
            is_sensitive,
        }
    }

    /// Build a provisional image record. The image path is attached later.
    pub fn image(hash: ContentDigest, is_sensitive: bool) -> Self {
        Self {
            id: RecordId::new(),
            preview_text: IMAGE_PREVIEW.to_string(),
            full_text: None,
            rich_text_path: None,
            html_path: None,
            image_path: None,
            image_hash: Some(hash),
            timestamp: next_timestamp_ms(),
            is_pinned: false,
            is_sensitive,
        }
    }

    /// `full_text` when present, otherwise the preview
    pub fn resolved_text(&self) -> &str {
        self.full_text.as_deref().unwrap_or(&self.preview_text)
    }

    pub fn is_image(&self) -> bool {
        self.image_hash.is_some() || self.image_path.is_some()
    }

    pub fn kind(&self) -> ContentKind {
        if self.is_image() {
            ContentKind::Image
        } else if self.rich_text_path.is_some() || self.html_path.is_some() {
            ContentKind::RichText
        } else {
            ContentKind::Text
        }
    }

    pub fn asset_path(&self, kind: AssetKind) -> Option<&Path> {
        match kind {
            AssetKind::Rtf => self.rich_text_path.as_deref(),
            AssetKind::Html => self.html_path.as_deref(),
            AssetKind::Image => self.image_path.as_deref(),
        }
    }

    pub fn set_asset_path(&mut self, kind: AssetKind, path: Option<PathBuf>) {
        match kind {
            AssetKind::Rtf => self.rich_text_path = path,
            AssetKind::Html => self.html_path = path,
            AssetKind::Image => self.image_path = path,
        }
    }

    /// Every asset file this record references
    pub fn asset_paths(&self) -> impl Iterator<Item = &Path> {
        [
            self.rich_text_path.as_deref(),
            self.html_path.as_deref(),
            self.image_path.as_deref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Text that is safe to put in a log line.
    /// Content-free description for logs
    pub fn log_label(&self) -> String {
        let kind = self.kind();
        match (kind, self.is_sensitive) {
            (ContentKind::Image, false) => kind.as_str().to_string(),
            (ContentKind::Image, true) => format!("{}, sensitive", kind.as_str()),
            (_, false) => format!("{}, {} bytes", kind.as_str(), self.resolved_text().len()),
            (_, true) => format!(
                "{}, {} bytes, sensitive",
                kind.as_str(),
                self.resolved_text().len()
            ),
        }
    }

    /// Short text excerpt for trace logs; never available for sensitive records
    pub fn trace_excerpt(&self) -> Option<String> {
        (!self.is_sensitive).then(|| self.preview_text.chars().take(40).collect())
    }
}

/// Split text into a bounded preview and an optional full payload.
///
/// Text within the preview bound is stored as the preview alone. Longer text
/// keeps its full copy only while it stays under `FULL_TEXT_CAP_BYTES`;
/// beyond that the tail is dropped.
pub fn bound_text(text: &str) -> (String, Option<String>) {
    match text.char_indices().nth(MAX_PREVIEW_CHARS) {
        None => (text.to_string(), None),
        Some((cut, _)) => {
            let preview = text[..cut].to_string();
            if text.len() <= FULL_TEXT_CAP_BYTES {
                (preview, Some(text.to_string()))
            } else {
                (preview, None)
            }
        }
    }
}

static LAST_TIMESTAMP_MS: AtomicI64 = AtomicI64::new(0);

/// Wall-clock milliseconds, strictly increasing across calls in this process.
pub fn next_timestamp_ms() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_TIMESTAMP_MS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TIMESTAMP_MS.compare_exchange_weak(
            last,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

//! Materialize the current pasteboard contents into a provisional record.
//!
//! Capture only reads. Heavy payloads ride along in `PendingAssets` and are
//! written to the asset store later, off the owner thread, by `finalize`.

use std::collections::HashSet;

use super::asset_store::AssetStore;
use super::hashing::hash_bytes;
use super::pasteboard::{Pasteboard, PasteboardKind};
use super::types::{AssetKind, ClipboardRecord};

/// Pasteboard types that password managers and similar tools declare
pub const SENSITIVE_TYPE_MARKERS: &[&str] = &[
    "org.nspasteboard.ConcealedType",
    "org.nspasteboard.TransientType",
    "org.nspasteboard.AutoGeneratedType",
    "com.agilebits.onepassword",
    "de.petermaurer.TransientPasteboardType",
    "com.typeit4me.clipping",
    "Pasteboard generator type",
];

pub fn is_sensitive(markers: &HashSet<String>) -> bool {
    SENSITIVE_TYPE_MARKERS
        .iter()
        .any(|marker| markers.contains(*marker))
}

/// Payload bytes that still need to be written to the asset store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAssets {
    pub rich_text: Option<Vec<u8>>,
    pub html: Option<Vec<u8>>,
    pub image: Option<Vec<u8>>,
}

impl PendingAssets {
    pub fn is_empty(&self) -> bool {
        self.rich_text.is_none() && self.html.is_none() && self.image.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct CapturedContent {
    pub record: ClipboardRecord,
    pub assets: PendingAssets,
}

impl CapturedContent {
    /// Write pending payloads and attach their paths. Failed saves leave the
    /// path unset.
    pub fn finalize(self, store: &AssetStore) -> ClipboardRecord {
        let Self { mut record, assets } = self;
        let pending = [
            (AssetKind::Rtf, assets.rich_text),
            (AssetKind::Html, assets.html),
            (AssetKind::Image, assets.image),
        ];
        for (kind, bytes) in pending {
            if let Some(bytes) = bytes {
                record.set_asset_path(kind, store.save(&bytes, kind));
            }
        }
        record
    }
}

/// Read the pasteboard and build a candidate record, or `None` when it holds
/// neither an image nor text.
pub fn capture_current_content(pasteboard: &mut dyn Pasteboard) -> Option<CapturedContent> {
    let text = pasteboard.read_string();
    capture_with_text(pasteboard, text)
}

/// Like [`capture_current_content`] for callers that already read the text.
pub fn capture_with_text(
    pasteboard: &mut dyn Pasteboard,
    text: Option<String>,
) -> Option<CapturedContent> {
    let sensitive = is_sensitive(&pasteboard.type_markers());

    if let Some(png) = pasteboard
        .read_data(PasteboardKind::Png)
        .filter(|bytes| !bytes.is_empty())
    {
        return Some(CapturedContent {
            record: ClipboardRecord::image(hash_bytes(&png), sensitive),
            assets: PendingAssets {
                image: Some(png),
                ..PendingAssets::default()
            },
        });
    }

    let text = text?;
    let rich_text = pasteboard
        .read_data(PasteboardKind::Rtf)
        .or_else(|| pasteboard.read_data(PasteboardKind::Rtfd))
        .filter(|bytes| !bytes.is_empty());
    let html = pasteboard
        .read_data(PasteboardKind::Html)
        .filter(|bytes| !bytes.is_empty());

    Some(CapturedContent {
        record: ClipboardRecord::text(&text, sensitive),
        assets: PendingAssets {
            rich_text,
            html,
            image: None,
        },
    })
}

//! Pasteboard capability used by capture, the monitor and paste-back.
//!
//! `SystemPasteboard` goes through arboard for text and images and through
//! NSPasteboard directly for RTF/HTML payloads and type markers.

use anyhow::{Context, Result};
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::change_detection::{
    get_pasteboard_change_count, read_pasteboard_data, read_pasteboard_types,
};

/// Typed payloads the capture path asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PasteboardKind {
    Rtf,
    Rtfd,
    Html,
    Png,
}

impl PasteboardKind {
    pub fn uti(&self) -> &'static str {
        match self {
            PasteboardKind::Rtf => "public.rtf",
            PasteboardKind::Rtfd => "com.apple.flat-rtfd",
            PasteboardKind::Html => "public.html",
            PasteboardKind::Png => "public.png",
        }
    }
}

/// Rich companion written next to plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RichData {
    Html(String),
    Rtf(Vec<u8>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasteboardWrite {
    pub text: Option<String>,
    pub rich: Option<RichData>,
    pub image_png: Option<Vec<u8>>,
}

impl PasteboardWrite {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.rich.is_none() && self.image_png.is_none()
    }
}

/// Read/write access to the system pasteboard.
///
/// Only used from the history owner thread, so implementations need not be
/// `Send`.
pub trait Pasteboard {
    /// Opaque counter bumped on every pasteboard change, if the platform has one
    fn change_count(&mut self) -> Option<i64>;
    fn read_string(&mut self) -> Option<String>;
    fn read_data(&mut self, kind: PasteboardKind) -> Option<Vec<u8>>;
    fn type_markers(&mut self) -> HashSet<String>;
    fn write(&mut self, content: &PasteboardWrite) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

pub struct SystemPasteboard {
    clipboard: arboard::Clipboard,
}

impl SystemPasteboard {
    pub fn new() -> Result<Self> {
        let clipboard = arboard::Clipboard::new().context("Failed to open system clipboard")?;
        Ok(Self { clipboard })
    }
}

impl Pasteboard for SystemPasteboard {
    fn change_count(&mut self) -> Option<i64> {
        get_pasteboard_change_count()
    }

    fn read_string(&mut self) -> Option<String> {
        self.clipboard.get_text().ok()
    }

    fn read_data(&mut self, kind: PasteboardKind) -> Option<Vec<u8>> {
        match kind {
            PasteboardKind::Png => {
                if let Some(bytes) = read_pasteboard_data(kind.uti()) {
                    return Some(bytes);
                }
                let image = self.clipboard.get_image().ok()?;
                match encode_png(&image) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        warn!(error = %e, "Failed to encode clipboard image");
                        None
                    }
                }
            }
            PasteboardKind::Rtf | PasteboardKind::Rtfd | PasteboardKind::Html => {
                read_pasteboard_data(kind.uti())
            }
        }
    }

    fn type_markers(&mut self) -> HashSet<String> {
        read_pasteboard_types()
    }

    fn write(&mut self, content: &PasteboardWrite) -> Result<()> {
        if let Some(png) = &content.image_png {
            let image = decode_png(png)?;
            return self
                .clipboard
                .set_image(image)
                .context("Failed to write image to clipboard");
        }

        match (&content.rich, &content.text) {
            (Some(RichData::Html(html)), text) => self
                .clipboard
                .set()
                .html(html.clone(), text.clone())
                .context("Failed to write HTML to clipboard"),
            (Some(RichData::Rtf(_)), Some(text)) => {
                debug!("RTF write-back is not supported, writing plain text");
                self.clipboard
                    .set_text(text.clone())
                    .context("Failed to write text to clipboard")
            }
            (None, Some(text)) => self
                .clipboard
                .set_text(text.clone())
                .context("Failed to write text to clipboard"),
            (Some(RichData::Rtf(_)), None) | (None, None) => {
                anyhow::bail!("Nothing to write to the clipboard")
            }
        }
    }

    fn clear(&mut self) -> Result<()> {
        self.clipboard
            .clear()
            .context("Failed to clear clipboard")
    }
}

/// Encode arboard RGBA pixels as PNG bytes.
pub fn encode_png(image: &arboard::ImageData<'_>) -> Result<Vec<u8>> {
    use std::io::Cursor;

    let rgba_image = image::RgbaImage::from_raw(
        image.width as u32,
        image.height as u32,
        image.bytes.to_vec(),
    )
    .context("Failed to create RGBA image from clipboard data")?;

    let mut png_data = Vec::new();
    rgba_image
        .write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
        .context("Failed to encode image as PNG")?;
    Ok(png_data)
}

pub fn decode_png(png: &[u8]) -> Result<arboard::ImageData<'static>> {
    let img = image::load_from_memory_with_format(png, image::ImageFormat::Png)
        .context("Failed to decode PNG")?;
    let rgba = img.to_rgba8();
    Ok(arboard::ImageData {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        bytes: Cow::Owned(rgba.into_raw()),
    })
}

//! In-memory fakes for the pasteboard and the stores.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::pasteboard::{Pasteboard, PasteboardKind, PasteboardWrite, RichData};
use super::store::{HistoryStore, KeyValueStore};
use super::types::{ClipboardRecord, RecordId};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct PasteboardState {
    change_count: i64,
    text: Option<String>,
    data: HashMap<PasteboardKind, Vec<u8>>,
    markers: HashSet<String>,
    writes: Vec<PasteboardWrite>,
}

/// Shared fake pasteboard; clones see the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryPasteboard {
    state: Arc<Mutex<PasteboardState>>,
}

impl MemoryPasteboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an external copy of plain text.
    pub fn copy_text(&self, text: &str) {
        let mut state = self.state.lock();
        state.change_count += 1;
        state.text = Some(text.to_string());
        state.data.clear();
        state.markers.clear();
    }

    pub fn copy_rich_text(&self, text: &str, html: &str, rtf: &[u8]) {
        self.copy_text(text);
        let mut state = self.state.lock();
        state.data.insert(PasteboardKind::Html, html.as_bytes().to_vec());
        state.data.insert(PasteboardKind::Rtf, rtf.to_vec());
    }

    pub fn copy_image(&self, png: &[u8]) {
        let mut state = self.state.lock();
        state.change_count += 1;
        state.text = None;
        state.data.clear();
        state.markers.clear();
        state.data.insert(PasteboardKind::Png, png.to_vec());
    }

    pub fn set_markers(&self, markers: &[&str]) {
        self.state.lock().markers = markers.iter().map(|m| m.to_string()).collect();
    }

    /// Change the counter without touching the contents.
    pub fn bump_change_count(&self) {
        self.state.lock().change_count += 1;
    }

    pub fn writes(&self) -> Vec<PasteboardWrite> {
        self.state.lock().writes.clone()
    }

    pub fn current_text(&self) -> Option<String> {
        self.state.lock().text.clone()
    }
}

impl Pasteboard for MemoryPasteboard {
    fn change_count(&mut self) -> Option<i64> {
        Some(self.state.lock().change_count)
    }

    fn read_string(&mut self) -> Option<String> {
        self.state.lock().text.clone()
    }

    fn read_data(&mut self, kind: PasteboardKind) -> Option<Vec<u8>> {
        self.state.lock().data.get(&kind).cloned()
    }

    fn type_markers(&mut self) -> HashSet<String> {
        self.state.lock().markers.clone()
    }

    fn write(&mut self, content: &PasteboardWrite) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.change_count += 1;
        state.text = content.text.clone();
        state.data.clear();
        state.markers.clear();
        if let Some(png) = &content.image_png {
            state.data.insert(PasteboardKind::Png, png.clone());
        }
        match &content.rich {
            Some(RichData::Html(html)) => {
                state.data.insert(PasteboardKind::Html, html.as_bytes().to_vec());
            }
            Some(RichData::Rtf(rtf)) => {
                state.data.insert(PasteboardKind::Rtf, rtf.clone());
            }
            None => {}
        }
        state.writes.push(content.clone());
        Ok(())
    }

    fn clear(&mut self) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.change_count += 1;
        state.text = None;
        state.data.clear();
        state.markers.clear();
        Ok(())
    }
}

fn injected_failure() -> StoreError {
    StoreError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some("injected failure".to_string()),
    ))
}

/// Vec-backed store whose operations can be made to fail on demand.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    records: Arc<Mutex<Vec<ClipboardRecord>>>,
    failing: Arc<AtomicBool>,
    load_failing: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only `load_all`; writes keep working
    pub fn set_load_failing(&self, failing: bool) {
        self.load_failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<ClipboardRecord> {
        self.records.lock().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(injected_failure())
        } else {
            Ok(())
        }
    }
}

impl HistoryStore for FlakyStore {
    fn persist_all(&mut self, records: &[ClipboardRecord]) -> Result<(), StoreError> {
        self.check()?;
        *self.records.lock() = records.to_vec();
        Ok(())
    }

    fn persist_one(&mut self, record: &ClipboardRecord) -> Result<(), StoreError> {
        self.check()?;
        let mut records = self.records.lock();
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            *existing = record.clone();
        } else {
            let front = if record.is_pinned {
                0
            } else {
                records.iter().take_while(|r| r.is_pinned).count()
            };
            records.insert(front, record.clone());
        }
        Ok(())
    }

    fn load_all(&mut self) -> Result<Vec<ClipboardRecord>, StoreError> {
        self.check()?;
        if self.load_failing.load(Ordering::SeqCst) {
            return Err(injected_failure());
        }
        Ok(self.records.lock().clone())
    }

    fn prune_oldest(&mut self, keep: usize) -> Result<(), StoreError> {
        self.check()?;
        let mut unpinned_seen = 0;
        self.records.lock().retain(|r| {
            if r.is_pinned {
                return true;
            }
            unpinned_seen += 1;
            unpinned_seen <= keep
        });
        Ok(())
    }

    fn delete_records(&mut self, ids: &[RecordId]) -> Result<(), StoreError> {
        self.check()?;
        self.records.lock().retain(|r| !ids.contains(&r.id));
        Ok(())
    }
}

/// HashMap-backed key-value store; clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    values: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    condition()
}

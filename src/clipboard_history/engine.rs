//! History engine service
//!
//! One owner thread holds the `HistoryModel`, the store and the pasteboard
//! and applies requests in arrival order; `ClipboardHistory` is the handle
//! consumers talk to. Timers and the asset saver never touch the model, they
//! only send requests back to the owner.

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::asset_store::{AssetStore, GcReport};
use super::capture::CapturedContent;
use super::gc::{run_collection, spawn_gc_timer, GcReply};
use super::history::{HistoryModel, InsertOutcome};
use super::monitor::{spawn_periodic, ChangeMonitor, PollResult, TickOutcome};
use super::pasteboard::{Pasteboard, PasteboardWrite, RichData};
use super::store::HistoryStore;
use super::types::{AssetKind, ClipboardRecord, RecordId};
use crate::config::EngineConfig;
use crate::error::{EngineError, ResultExt, StoreError};

/// Notification sent to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// The snapshot changed
    Changed { revision: u64, len: usize },
    Warning(EngineWarning),
}

/// Non-blocking advisories for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineWarning {
    /// Rich text and images cannot be kept; plain text still works
    AssetStoreUnavailable,
    /// Writes are landing in the fallback store
    UsingFallbackStorage,
    /// The latest change could not be written anywhere; it lives in memory only
    PersistenceIncomplete,
    /// Stored history could not be read at startup
    HistoryLoadFailed,
}

impl EngineWarning {
    pub fn message(&self) -> &'static str {
        match self {
            Self::AssetStoreUnavailable => {
                "Clipboard files cannot be saved; rich text and images will not be kept"
            }
            Self::UsingFallbackStorage => "Clipboard history is using fallback storage",
            Self::PersistenceIncomplete => "Clipboard history may not be fully saved",
            Self::HistoryLoadFailed => "Previous clipboard history could not be loaded",
        }
    }
}

enum EngineRequest {
    /// Poll timer fired
    Tick,
    PollNow {
        reply: SyncSender<PollResult>,
    },
    /// Asset saving finished for a captured record
    Finalized(ClipboardRecord),
    Insert {
        record: ClipboardRecord,
        reply: SyncSender<InsertOutcome>,
    },
    TogglePin {
        id: RecordId,
        reply: SyncSender<Result<bool, EngineError>>,
    },
    Delete {
        id: RecordId,
        reply: SyncSender<Result<(), EngineError>>,
    },
    Clear {
        keep_pinned: bool,
        reply: SyncSender<usize>,
    },
    CopyToPasteboard {
        id: RecordId,
        reply: SyncSender<Result<(), EngineError>>,
    },
    /// `None` when the GC timer asked
    CollectGarbage {
        reply: Option<GcReply>,
    },
    Subscribe(async_channel::Sender<HistoryEvent>),
    Shutdown,
}

/// State readable without going through the owner
struct Shared {
    snapshot: RwLock<Arc<Vec<ClipboardRecord>>>,
    warnings: Mutex<Vec<EngineWarning>>,
    /// A Tick is queued and not yet handled
    tick_pending: AtomicBool,
}

impl Shared {
    fn record_warning(&self, warning: EngineWarning) {
        let mut warnings = self.warnings.lock();
        if !warnings.contains(&warning) {
            warnings.push(warning);
        }
    }
}

/// Handle to a running clipboard history engine.
///
/// Dropping the handle shuts the engine down.
pub struct ClipboardHistory {
    requests: Sender<EngineRequest>,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ClipboardHistory {
    /// Load the stored history and start the owner thread and timers.
    ///
    /// Migration and the initial load finish before anything is spawned, so
    /// no capture can race them. `make_pasteboard` runs on the owner thread;
    /// if it fails the engine runs without pasteboard access.
    pub fn start<S, P, F>(
        config: &EngineConfig,
        store: S,
        assets: AssetStore,
        make_pasteboard: F,
    ) -> Result<Self, EngineError>
    where
        S: HistoryStore + 'static,
        P: Pasteboard + 'static,
        F: FnOnce() -> anyhow::Result<P> + Send + 'static,
    {
        let mut store: Box<dyn HistoryStore> = Box::new(store);
        let mut warnings = Vec::new();

        if !assets.is_available() {
            warn!("Asset directory unavailable, rich content will not be kept");
            warnings.push(EngineWarning::AssetStoreUnavailable);
        }

        match store.migrate_legacy() {
            Ok(0) => {}
            Ok(count) => info!(count, "Migrated legacy clipboard history"),
            Err(e) => warn!(error = %e, "Legacy history migration failed, will retry next start"),
        }

        let (stored, load_ok) = match store.load_all() {
            Ok(records) => (records, true),
            Err(e) => {
                error!(error = %e, "Failed to load clipboard history, starting empty");
                warnings.push(EngineWarning::HistoryLoadFailed);
                (Vec::new(), false)
            }
        };

        let (model, dropped) = HistoryModel::from_records(stored, config.max_history_count);
        if !dropped.is_empty() {
            info!(
                dropped = dropped.len(),
                kept = model.len(),
                "Dropped duplicate and excess records from stored history"
            );
            release_assets(&assets, &model, &dropped);
            let ids: Vec<RecordId> = dropped.iter().map(|r| r.id).collect();
            store.delete_records(&ids).warn_on_err();
            store.prune_oldest(config.max_history_count).warn_on_err();
        }

        let fallback_reported = store.is_degraded();
        // a history read from the fallback may lack primary rows
        let reconciled = load_ok && !fallback_reported;
        if fallback_reported {
            warn!("Clipboard history started on fallback storage");
            warnings.push(EngineWarning::UsingFallbackStorage);
        }

        let shared = Arc::new(Shared {
            snapshot: RwLock::new(Arc::new(model.records().to_vec())),
            warnings: Mutex::new(warnings),
            tick_pending: AtomicBool::new(false),
        });
        let stop = Arc::new(AtomicBool::new(false));
        let (requests, inbox) = mpsc::channel();

        let saver = spawn_asset_saver(assets.clone(), requests.clone())?;
        let monitor = ChangeMonitor::new(config.self_write_grace(), config.max_text_bytes);
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let owner_shared = shared.clone();
        let owner = thread::Builder::new()
            .name("clipboard-history".to_string())
            .spawn(move || {
                // the pasteboard is not Send, so it is created where it is used
                let pasteboard = match make_pasteboard() {
                    Ok(pasteboard) => Some(Box::new(pasteboard) as Box<dyn Pasteboard>),
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "Pasteboard unavailable, capture disabled");
                        None
                    }
                };
                let _ = ready_tx.send(pasteboard.is_some());

                Owner {
                    model,
                    store,
                    assets,
                    pasteboard,
                    monitor,
                    shared: owner_shared,
                    subscribers: Vec::new(),
                    saver,
                    fallback_reported,
                    reconciled,
                    removed_unreconciled: HashSet::new(),
                    gc_running: Arc::new(AtomicBool::new(false)),
                }
                .run(inbox);
            })
            .map_err(EngineError::Thread)?;

        let pasteboard_ready = ready_rx.recv().map_err(|_| EngineError::Stopped)?;
        let mut threads = vec![owner];

        let poll_interval = config.poll_interval();
        if pasteboard_ready && !poll_interval.is_zero() {
            let requests = requests.clone();
            let shared = shared.clone();
            threads.push(spawn_periodic(
                "clipboard-poll",
                poll_interval,
                poll_interval,
                stop.clone(),
                move || {
                    // a slow owner gets one queued tick, not a backlog
                    if shared.tick_pending.swap(true, Ordering::AcqRel) {
                        return true;
                    }
                    requests.send(EngineRequest::Tick).is_ok()
                },
            ));
        }

        if !config.gc_interval().is_zero() {
            let requests = requests.clone();
            threads.push(spawn_gc_timer(
                config.gc_initial_delay(),
                config.gc_interval(),
                stop.clone(),
                move || {
                    requests
                        .send(EngineRequest::CollectGarbage { reply: None })
                        .is_ok()
                },
            ));
        }

        info!(
            records = shared.snapshot.read().len(),
            max_history_count = config.max_history_count,
            pasteboard = pasteboard_ready,
            "Clipboard history engine started"
        );

        Ok(Self {
            requests,
            shared,
            stop,
            threads: Mutex::new(threads),
        })
    }

    fn call<T>(
        &self,
        build: impl FnOnce(SyncSender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply, response) = mpsc::sync_channel(1);
        self.requests
            .send(build(reply))
            .map_err(|_| EngineError::Stopped)?;
        response.recv().map_err(|_| EngineError::Stopped)
    }

    pub fn insert(&self, record: ClipboardRecord) -> Result<InsertOutcome, EngineError> {
        self.call(|reply| EngineRequest::Insert { record, reply })
    }

    /// Returns the new pin state.
    pub fn toggle_pin(&self, id: RecordId) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::TogglePin { id, reply })?
    }

    pub fn delete(&self, id: RecordId) -> Result<(), EngineError> {
        self.call(|reply| EngineRequest::Delete { id, reply })?
    }

    /// Returns how many records were removed.
    pub fn clear(&self, keep_pinned: bool) -> Result<usize, EngineError> {
        self.call(|reply| EngineRequest::Clear { keep_pinned, reply })
    }

    /// Latest committed history, pinned records first
    pub fn current_snapshot(&self) -> Arc<Vec<ClipboardRecord>> {
        self.shared.snapshot.read().clone()
    }

    pub fn get(&self, id: RecordId) -> Option<ClipboardRecord> {
        self.current_snapshot().iter().find(|r| r.id == id).cloned()
    }

    /// Receive an event for every committed change and advisory from now on.
    pub fn subscribe(&self) -> async_channel::Receiver<HistoryEvent> {
        let (tx, rx) = async_channel::unbounded();
        if self.requests.send(EngineRequest::Subscribe(tx)).is_err() {
            debug!("Subscribe after shutdown, channel is closed");
        }
        rx
    }

    /// Distinct advisories raised since startup
    pub fn warnings(&self) -> Vec<EngineWarning> {
        self.shared.warnings.lock().clone()
    }

    /// Write a record back to the pasteboard without re-recording it.
    pub fn copy_to_pasteboard(&self, id: RecordId) -> Result<(), EngineError> {
        self.call(|reply| EngineRequest::CopyToPasteboard { id, reply })?
    }

    /// Run an orphan collection pass now and wait for its report.
    pub fn collect_garbage(&self) -> Result<GcReport, EngineError> {
        Ok(self.call(|reply| EngineRequest::CollectGarbage { reply: Some(reply) })??)
    }

    /// Run one monitor tick now, outside the poll timer.
    pub fn poll_now(&self) -> Result<PollResult, EngineError> {
        self.call(|reply| EngineRequest::PollNow { reply })
    }

    /// Stop the timers and the owner thread. Idempotent.
    ///
    /// Asset saves already in flight still finish; their results are dropped.
    pub fn shutdown(&self) {
        let threads = std::mem::take(&mut *self.threads.lock());
        if threads.is_empty() {
            return;
        }
        self.stop.store(true, Ordering::Release);
        let _ = self.requests.send(EngineRequest::Shutdown);
        for handle in threads {
            if handle.join().is_err() {
                error!("Clipboard history thread panicked");
            }
        }
        info!("Clipboard history engine stopped");
    }
}

impl Drop for ClipboardHistory {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Saves pending assets in capture order and hands each finished record
/// back to the owner.
fn spawn_asset_saver(
    assets: AssetStore,
    requests: Sender<EngineRequest>,
) -> Result<Sender<CapturedContent>, EngineError> {
    let (tx, rx) = mpsc::channel::<CapturedContent>();
    thread::Builder::new()
        .name("clipboard-asset-saver".to_string())
        .spawn(move || {
            for captured in rx {
                let record = captured.finalize(&assets);
                if requests.send(EngineRequest::Finalized(record)).is_err() {
                    // saved files become orphans for the next collection
                    debug!("History owner gone, dropping finalized capture");
                }
            }
        })
        .map_err(EngineError::Thread)?;
    Ok(tx)
}

/// Delete asset files of `removed` records that nothing in `model` still
/// references.
fn release_assets<'a>(
    assets: &AssetStore,
    model: &HistoryModel,
    removed: impl IntoIterator<Item = &'a ClipboardRecord>,
) {
    let referenced: HashSet<PathBuf> = model.referenced_asset_paths();
    for path in removed.into_iter().flat_map(|r| r.asset_paths()) {
        if !referenced.contains(path) {
            assets.delete(path);
        }
    }
}

struct Owner {
    model: HistoryModel,
    store: Box<dyn HistoryStore>,
    assets: AssetStore,
    pasteboard: Option<Box<dyn Pasteboard>>,
    monitor: ChangeMonitor,
    shared: Arc<Shared>,
    subscribers: Vec<async_channel::Sender<HistoryEvent>>,
    saver: Sender<CapturedContent>,
    /// The fallback advisory was raised for the current degradation episode
    fallback_reported: bool,
    /// The model holds everything the primary store holds. Until then only
    /// incremental writes reach the store.
    reconciled: bool,
    /// Removed while unreconciled; kept out of the next reconcile
    removed_unreconciled: HashSet<RecordId>,
    gc_running: Arc<AtomicBool>,
}

impl Owner {
    fn run(mut self, inbox: Receiver<EngineRequest>) {
        info!("History owner loop started");
        for request in inbox {
            if !self.handle(request) {
                break;
            }
        }
        info!("History owner loop ended");
    }

    fn handle(&mut self, request: EngineRequest) -> bool {
        match request {
            EngineRequest::Tick => {
                self.shared.tick_pending.store(false, Ordering::Release);
                self.poll();
            }
            EngineRequest::PollNow { reply } => {
                let _ = reply.send(self.poll());
            }
            EngineRequest::Finalized(record) => {
                self.insert(record);
            }
            EngineRequest::Insert { record, reply } => {
                let _ = reply.send(self.insert(record));
            }
            EngineRequest::TogglePin { id, reply } => {
                let _ = reply.send(self.toggle_pin(id));
            }
            EngineRequest::Delete { id, reply } => {
                let _ = reply.send(self.delete(id));
            }
            EngineRequest::Clear { keep_pinned, reply } => {
                let _ = reply.send(self.clear(keep_pinned));
            }
            EngineRequest::CopyToPasteboard { id, reply } => {
                let _ = reply.send(self.copy_to_pasteboard(id));
            }
            EngineRequest::CollectGarbage { reply } => {
                run_collection(
                    self.assets.clone(),
                    self.model.referenced_asset_paths(),
                    self.gc_running.clone(),
                    reply,
                );
            }
            EngineRequest::Subscribe(tx) => self.subscribers.push(tx),
            EngineRequest::Shutdown => return false,
        }
        true
    }

    fn poll(&mut self) -> PollResult {
        let Some(pasteboard) = self.pasteboard.as_deref_mut() else {
            return PollResult::NoContent;
        };
        let outcome = self.monitor.tick(pasteboard, Instant::now());
        let summary = outcome.summary();
        if let TickOutcome::Captured(captured) = outcome {
            self.accept_capture(captured);
        }
        summary
    }

    fn accept_capture(&mut self, captured: CapturedContent) {
        if captured.assets.is_empty() {
            self.insert(captured.record);
            return;
        }
        if let Err(mpsc::SendError(captured)) = self.saver.send(captured) {
            warn!("Asset saver stopped, keeping capture without its files");
            let record = captured.record;
            self.insert(record);
        }
    }

    fn insert(&mut self, record: ClipboardRecord) -> InsertOutcome {
        let label = record.log_label();
        let outcome = self.model.insert(record);
        let Some(id) = outcome.inserted else {
            debug!(label = %label, "Record already in history, skipped");
            return outcome;
        };

        release_assets(&self.assets, &self.model, outcome.removed());
        let removed_ids: Vec<RecordId> = outcome.removed().map(|r| r.id).collect();
        debug!(
            id = %id,
            label = %label,
            replaced = outcome.replaced.is_some(),
            evicted = outcome.evicted.len(),
            "Inserted history record"
        );

        self.note_removed(&removed_ids);
        self.persist_insert(id, &removed_ids);
        self.publish();
        outcome
    }

    fn toggle_pin(&mut self, id: RecordId) -> Result<bool, EngineError> {
        let pinned = self.model.toggle_pin(id).ok_or(EngineError::NotFound(id))?;
        info!(id = %id, pinned, "Toggled history record pin");
        self.persist_changes("toggle_pin", &[id], &[]);
        self.publish();
        Ok(pinned)
    }

    fn delete(&mut self, id: RecordId) -> Result<(), EngineError> {
        let removed = self.model.delete(id).ok_or(EngineError::NotFound(id))?;
        release_assets(&self.assets, &self.model, [&removed]);
        info!(id = %id, "Deleted history record");
        self.note_removed(&[id]);
        self.persist_changes("delete", &[], &[id]);
        self.publish();
        Ok(())
    }

    fn clear(&mut self, keep_pinned: bool) -> usize {
        let removed = self.model.clear(keep_pinned);
        if removed.is_empty() {
            return 0;
        }
        release_assets(&self.assets, &self.model, &removed);
        info!(removed = removed.len(), keep_pinned, "Cleared clipboard history");
        let removed_ids: Vec<RecordId> = removed.iter().map(|r| r.id).collect();
        self.note_removed(&removed_ids);
        self.persist_changes("clear", &[], &removed_ids);
        self.publish();
        removed.len()
    }

    fn copy_to_pasteboard(&mut self, id: RecordId) -> Result<(), EngineError> {
        let record = self.model.get(id).cloned().ok_or(EngineError::NotFound(id))?;

        let load = |kind: AssetKind| {
            record
                .asset_path(kind)
                .and_then(|path| self.assets.load(path))
        };
        let image_png = load(AssetKind::Image);
        let rich = load(AssetKind::Html)
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .map(RichData::Html)
            .or_else(|| load(AssetKind::Rtf).map(RichData::Rtf));
        let text = (!record.is_image()).then(|| record.resolved_text().to_string());

        let content = PasteboardWrite {
            text,
            rich,
            image_png,
        };
        if content.is_empty() {
            return Err(EngineError::NothingToWrite(id));
        }

        let pasteboard = self
            .pasteboard
            .as_deref_mut()
            .ok_or_else(|| EngineError::Pasteboard("pasteboard is unavailable".to_string()))?;
        pasteboard
            .write(&content)
            .map_err(|e| EngineError::Pasteboard(format!("{e:#}")))?;
        self.monitor.note_self_write(Instant::now());

        info!(id = %id, kind = record.kind().as_str(), "Copied history record to pasteboard");
        Ok(())
    }

    /// Incremental write for the insert path; a failure escalates to a full
    /// rewrite. The inserted record may already be evicted, the removals
    /// still reach the store.
    fn persist_insert(&mut self, id: RecordId, removed_ids: &[RecordId]) {
        let upserted: Vec<RecordId> = self.model.get(id).map(|_| id).into_iter().collect();
        match self.persist_incremental(&upserted, removed_ids) {
            Ok(()) => self.track_degradation(),
            Err(e) => {
                warn!(error = %e, id = %id, "Incremental persist failed, rewriting full history");
                self.persist_changes("insert", &upserted, removed_ids);
            }
        }
    }

    fn persist_incremental(
        &mut self,
        upserted: &[RecordId],
        removed_ids: &[RecordId],
    ) -> Result<(), StoreError> {
        for id in upserted {
            if let Some(record) = self.model.get(*id) {
                self.store.persist_one(record)?;
            }
        }
        if removed_ids.is_empty() {
            Ok(())
        } else {
            self.store.delete_records(removed_ids)
        }
    }

    /// Write a change through. The whole collection is rewritten only once
    /// the model is known to cover the stored history.
    fn persist_changes(
        &mut self,
        operation: &'static str,
        upserted: &[RecordId],
        removed_ids: &[RecordId],
    ) {
        let result = if self.reconciled || self.reconcile() {
            self.store.persist_all(self.model.records())
        } else {
            debug!(operation, "Stored history not reconciled, writing the change only");
            self.persist_incremental(upserted, removed_ids)
        };
        if let Err(e) = result {
            error!(
                error = %e,
                operation,
                severity = ?e.severity(),
                records = self.model.len(),
                "Failed to persist clipboard history, keeping it in memory"
            );
            self.raise(EngineWarning::PersistenceIncomplete);
        }
        self.track_degradation();
    }

    /// Reload the primary history and fold it into the model.
    ///
    /// Returns whether the model now covers the stored history.
    fn reconcile(&mut self) -> bool {
        let stored = match self.store.load_all() {
            Ok(stored) => stored,
            Err(e) => {
                debug!(error = %e, "Stored history still unreadable");
                return false;
            }
        };
        let stored: Vec<ClipboardRecord> = stored
            .into_iter()
            .filter(|r| !self.removed_unreconciled.contains(&r.id))
            .collect();

        let before = self.model.len();
        let dropped = self.model.absorb(stored);
        if !dropped.is_empty() {
            release_assets(&self.assets, &self.model, &dropped);
            let ids: Vec<RecordId> = dropped.iter().map(|r| r.id).collect();
            self.store.delete_records(&ids).warn_on_err();
        }
        if self.store.is_degraded() {
            return false;
        }

        info!(
            restored = self.model.len().saturating_sub(before),
            dropped = dropped.len(),
            "Reconciled memory with stored clipboard history"
        );
        self.reconciled = true;
        self.removed_unreconciled.clear();
        true
    }

    fn note_removed(&mut self, ids: &[RecordId]) {
        if !self.reconciled {
            self.removed_unreconciled.extend(ids.iter().copied());
        }
    }

    fn track_degradation(&mut self) {
        let degraded = self.store.is_degraded();
        if degraded && !self.fallback_reported {
            warn!("Primary history store failing, using fallback storage");
            self.raise(EngineWarning::UsingFallbackStorage);
        } else if !degraded && self.fallback_reported {
            info!("Primary history store recovered");
        }
        self.fallback_reported = degraded;
    }

    fn raise(&mut self, warning: EngineWarning) {
        self.shared.record_warning(warning);
        self.broadcast(HistoryEvent::Warning(warning));
    }

    fn publish(&mut self) {
        *self.shared.snapshot.write() = Arc::new(self.model.records().to_vec());
        self.broadcast(HistoryEvent::Changed {
            revision: self.model.revision(),
            len: self.model.len(),
        });
    }

    fn broadcast(&mut self, event: HistoryEvent) {
        // closed receivers drop out
        self.subscribers
            .retain(|tx| tx.try_send(event.clone()).is_ok());
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

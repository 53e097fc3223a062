//! Orphaned asset collection
//!
//! The timer only asks the owner for a pass; the owner hands the referenced
//! paths of its current snapshot to a worker thread that reconciles the
//! asset directory and replies directly to whoever asked.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::asset_store::{AssetStore, GcReport};
use super::monitor::spawn_periodic;
use crate::error::AssetError;

pub type GcReply = SyncSender<Result<GcReport, AssetError>>;

/// Start the periodic collection timer.
///
/// `request` is called from the timer thread and returns false once the
/// owner is gone.
pub(crate) fn spawn_gc_timer<F>(
    initial_delay: Duration,
    interval: Duration,
    stop: Arc<AtomicBool>,
    request: F,
) -> JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    spawn_periodic("asset-gc", initial_delay, interval, stop, request)
}

/// Reconcile the asset directory against `referenced` on a worker thread.
///
/// `running` keeps scheduled passes from piling up; a pass that finds one in
/// flight is skipped and the caller gets an empty report.
pub(crate) fn run_collection(
    assets: AssetStore,
    referenced: HashSet<PathBuf>,
    running: Arc<AtomicBool>,
    reply: Option<GcReply>,
) {
    if running.swap(true, Ordering::AcqRel) {
        debug!("Asset collection already running, skipping");
        if let Some(reply) = reply {
            let _ = reply.send(Ok(GcReport::default()));
        }
        return;
    }

    thread::spawn(move || {
        let result = assets.reconcile_orphans(&referenced);
        running.store(false, Ordering::Release);
        match &result {
            Ok(report) if report.deleted > 0 => info!(
                deleted = report.deleted,
                bytes_freed = report.bytes_freed,
                scanned = report.scanned,
                "Removed orphaned clipboard assets"
            ),
            Ok(report) => debug!(
                scanned = report.scanned,
                skipped_unchanged = report.skipped_unchanged,
                "Asset collection found nothing to remove"
            ),
            Err(e) => warn!(error = %e, "Asset collection failed"),
        }
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    });
}

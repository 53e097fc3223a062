//! Pasteboard change monitor
//!
//! `ChangeMonitor::tick` is the per-poll state machine; it runs on the
//! history owner thread. The poll timer thread only sends "tick" requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::capture::{capture_with_text, CapturedContent};
use super::change_detection::ClipboardChangeDetector;
use super::hashing::{hash_bytes, hash_text, ContentDigest};
use super::pasteboard::{Pasteboard, PasteboardKind};

/// Longest a timer thread sleeps before rechecking its stop flag
const STOP_CHECK_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyText,
    OversizedText { len: usize },
}

#[derive(Debug)]
pub enum TickOutcome {
    /// Change counter did not move
    Unchanged,
    /// Change attributed to our own write inside the grace window
    SelfWrite,
    /// Same content as the last capture
    Duplicate,
    Rejected(RejectReason),
    /// Nothing capturable on the pasteboard
    NoContent,
    Captured(CapturedContent),
}

/// Summary of a tick without the captured payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    Unchanged,
    SelfWrite,
    Duplicate,
    Rejected(RejectReason),
    NoContent,
    Captured,
}

impl TickOutcome {
    pub fn summary(&self) -> PollResult {
        match self {
            TickOutcome::Unchanged => PollResult::Unchanged,
            TickOutcome::SelfWrite => PollResult::SelfWrite,
            TickOutcome::Duplicate => PollResult::Duplicate,
            TickOutcome::Rejected(reason) => PollResult::Rejected(*reason),
            TickOutcome::NoContent => PollResult::NoContent,
            TickOutcome::Captured(_) => PollResult::Captured,
        }
    }
}

pub struct ChangeMonitor {
    detector: ClipboardChangeDetector,
    last_text_hash: Option<ContentDigest>,
    last_image_hash: Option<ContentDigest>,
    last_self_write: Option<Instant>,
    grace: Duration,
    max_text_bytes: usize,
}

impl ChangeMonitor {
    pub fn new(grace: Duration, max_text_bytes: usize) -> Self {
        Self {
            detector: ClipboardChangeDetector::new(),
            last_text_hash: None,
            last_image_hash: None,
            last_self_write: None,
            grace,
            max_text_bytes,
        }
    }

    /// Remember that the engine itself just wrote to the pasteboard.
    pub fn note_self_write(&mut self, at: Instant) {
        self.last_self_write = Some(at);
    }

    pub fn tick(&mut self, pasteboard: &mut dyn Pasteboard, now: Instant) -> TickOutcome {
        // No counter means we cannot tell, so look at the content
        let changed = self
            .detector
            .observe(pasteboard.change_count())
            .unwrap_or(true);
        if !changed {
            return TickOutcome::Unchanged;
        }

        if let Some(written_at) = self.last_self_write.take() {
            if now.saturating_duration_since(written_at) <= self.grace {
                // what we wrote must not come back as a fresh capture later
                self.last_text_hash = pasteboard.read_string().map(|t| hash_text(&t));
                self.last_image_hash = pasteboard
                    .read_data(PasteboardKind::Png)
                    .map(|png| hash_bytes(&png));
                debug!("Ignoring pasteboard change caused by our own write");
                return TickOutcome::SelfWrite;
            }
        }

        let text = pasteboard.read_string();
        if let Some(text) = &text {
            let hash = hash_text(text);
            if self.last_text_hash.as_ref() == Some(&hash) {
                trace!("Pasteboard text unchanged");
                return TickOutcome::Duplicate;
            }
            self.last_text_hash = Some(hash);
        } else {
            self.last_text_hash = None;
        }

        let rejection = text.as_deref().and_then(|text| {
            if text.trim().is_empty() {
                Some(RejectReason::EmptyText)
            } else if text.len() > self.max_text_bytes {
                Some(RejectReason::OversizedText { len: text.len() })
            } else {
                None
            }
        });
        // keep the oversized string out of capture
        let text = if rejection.is_some() { None } else { text };

        let Some(captured) = capture_with_text(pasteboard, text) else {
            return match rejection {
                Some(reason) => {
                    warn!(?reason, "Rejected pasteboard text");
                    TickOutcome::Rejected(reason)
                }
                None => TickOutcome::NoContent,
            };
        };

        if captured.record.is_image() {
            if captured.record.image_hash.is_some()
                && self.last_image_hash == captured.record.image_hash
            {
                return TickOutcome::Duplicate;
            }
            self.last_image_hash = captured.record.image_hash.clone();
        }

        debug!(
            id = %captured.record.id,
            kind = captured.record.kind().as_str(),
            label = %captured.record.log_label(),
            "Captured pasteboard content"
        );
        trace!(excerpt = ?captured.record.trace_excerpt(), "Captured text excerpt");
        TickOutcome::Captured(captured)
    }
}

/// Sleep `total` in short slices. Returns false if `stop` was raised.
pub(crate) fn sleep_unless_stopped(stop: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_CHECK_SLICE));
    }
}

/// Run `fire` after `initial_delay` and then every `interval` until `stop`
/// is raised or `fire` returns false.
pub(crate) fn spawn_periodic<F>(
    name: &'static str,
    initial_delay: Duration,
    interval: Duration,
    stop: Arc<AtomicBool>,
    mut fire: F,
) -> JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    thread::spawn(move || {
        info!(
            timer = name,
            initial_delay_ms = initial_delay.as_millis() as u64,
            interval_ms = interval.as_millis() as u64,
            "Timer started"
        );
        let mut delay = initial_delay;
        while sleep_unless_stopped(&stop, delay) {
            if !fire() {
                break;
            }
            delay = interval;
        }
        info!(timer = name, "Timer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::testing::MemoryPasteboard;
    use crate::clipboard_history::pasteboard::PasteboardWrite;

    const GRACE: Duration = Duration::from_millis(1000);

    fn monitor() -> ChangeMonitor {
        ChangeMonitor::new(GRACE, 1024)
    }

    fn captured_text(outcome: TickOutcome) -> String {
        match outcome {
            TickOutcome::Captured(content) => content.record.resolved_text().to_string(),
            other => panic!("expected capture, got {:?}", other),
        }
    }

    #[test]
    fn test_unchanged_counter_is_cheap_noop() {
        let mut pasteboard = MemoryPasteboard::new();
        let mut monitor = monitor();
        pasteboard.copy_text("a");
        let now = Instant::now();
        assert_eq!(captured_text(monitor.tick(&mut pasteboard, now)), "a");
        assert_eq!(monitor.tick(&mut pasteboard, now).summary(), PollResult::Unchanged);
    }

    #[test]
    fn test_same_text_recopied_is_duplicate() {
        let mut pasteboard = MemoryPasteboard::new();
        let mut monitor = monitor();
        let now = Instant::now();
        pasteboard.copy_text("a");
        monitor.tick(&mut pasteboard, now);
        pasteboard.copy_text("a");
        assert_eq!(monitor.tick(&mut pasteboard, now).summary(), PollResult::Duplicate);
    }

    #[test]
    fn test_self_write_inside_grace_is_ignored() {
        let mut pasteboard = MemoryPasteboard::new();
        let mut monitor = monitor();
        let start = Instant::now();
        pasteboard.copy_text("before");
        monitor.tick(&mut pasteboard, start);

        pasteboard
            .write(&PasteboardWrite {
                text: Some("pasted back".into()),
                ..Default::default()
            })
            .unwrap();
        monitor.note_self_write(start);
        assert_eq!(
            monitor
                .tick(&mut pasteboard, start + Duration::from_millis(500))
                .summary(),
            PollResult::SelfWrite
        );

        // the written text does not resurface on a later counter bump
        pasteboard.bump_change_count();
        assert_eq!(
            monitor
                .tick(&mut pasteboard, start + Duration::from_millis(600))
                .summary(),
            PollResult::Duplicate
        );
    }

    #[test]
    fn test_image_self_write_does_not_resurface() {
        let mut pasteboard = MemoryPasteboard::new();
        let mut monitor = monitor();
        let start = Instant::now();
        pasteboard.copy_text("before");
        monitor.tick(&mut pasteboard, start);

        pasteboard
            .write(&PasteboardWrite {
                image_png: Some(b"pasted png".to_vec()),
                ..Default::default()
            })
            .unwrap();
        monitor.note_self_write(start);
        assert_eq!(
            monitor
                .tick(&mut pasteboard, start + Duration::from_millis(500))
                .summary(),
            PollResult::SelfWrite
        );

        pasteboard.bump_change_count();
        assert_eq!(
            monitor
                .tick(&mut pasteboard, start + GRACE + Duration::from_millis(1))
                .summary(),
            PollResult::Duplicate
        );
    }

    #[test]
    fn test_external_copy_after_grace_is_recorded() {
        let mut pasteboard = MemoryPasteboard::new();
        let mut monitor = monitor();
        let start = Instant::now();
        monitor.note_self_write(start);

        pasteboard.copy_text("external");
        let outcome = monitor.tick(&mut pasteboard, start + GRACE + Duration::from_millis(1));
        assert_eq!(captured_text(outcome), "external");
    }

    #[test]
    fn test_grace_is_consumed_by_one_change() {
        let mut pasteboard = MemoryPasteboard::new();
        let mut monitor = monitor();
        let start = Instant::now();
        monitor.note_self_write(start);
        pasteboard.copy_text("ours");
        monitor.tick(&mut pasteboard, start);

        pasteboard.copy_text("theirs");
        assert_eq!(captured_text(monitor.tick(&mut pasteboard, start)), "theirs");
    }

    #[test]
    fn test_rejects_blank_and_oversized_text() {
        let mut pasteboard = MemoryPasteboard::new();
        let mut monitor = monitor();
        let now = Instant::now();

        pasteboard.copy_text("   \n\t");
        assert_eq!(
            monitor.tick(&mut pasteboard, now).summary(),
            PollResult::Rejected(RejectReason::EmptyText)
        );

        pasteboard.copy_text(&"x".repeat(2048));
        assert_eq!(
            monitor.tick(&mut pasteboard, now).summary(),
            PollResult::Rejected(RejectReason::OversizedText { len: 2048 })
        );
    }

    #[test]
    fn test_empty_pasteboard_has_no_content() {
        let mut pasteboard = MemoryPasteboard::new();
        let mut monitor = monitor();
        pasteboard.bump_change_count();
        assert_eq!(
            monitor.tick(&mut pasteboard, Instant::now()).summary(),
            PollResult::NoContent
        );
    }

    #[test]
    fn test_same_image_recopied_is_duplicate() {
        let mut pasteboard = MemoryPasteboard::new();
        let mut monitor = monitor();
        let now = Instant::now();
        pasteboard.copy_image(b"png");
        assert_eq!(monitor.tick(&mut pasteboard, now).summary(), PollResult::Captured);
        pasteboard.copy_image(b"png");
        assert_eq!(monitor.tick(&mut pasteboard, now).summary(), PollResult::Duplicate);
        pasteboard.copy_image(b"other png");
        assert_eq!(monitor.tick(&mut pasteboard, now).summary(), PollResult::Captured);
    }

    #[test]
    fn test_sleep_unless_stopped_returns_early() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!sleep_unless_stopped(&stop, Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_periodic_timer_stops() {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = spawn_periodic(
            "test",
            Duration::ZERO,
            Duration::from_millis(5),
            stop.clone(),
            move || tx.send(()).is_ok(),
        );
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}

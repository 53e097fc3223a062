//! Structured JSONL logging plus human-readable stderr output.
//!
//! - **JSONL to file** (`<data dir>/logs/cliphist.jsonl`) for machine parsing
//! - **Compact to stderr** for people
//!
//! # Usage
//!
//! ```rust,ignore
//! use clip_history::logging;
//!
//! // keep the guard alive for the duration of the program
//! let _guard = logging::init(&config.log_dir());
//!
//! tracing::info!(record_id = %id, "Captured pasteboard content");
//! ```
//!
//! # JSONL Output Format
//!
//! ```json
//! {"timestamp":"2025-01-15T10:30:45.123Z","level":"INFO","target":"clip_history::clipboard_history::engine","fields":{"message":"Clipboard history engine started","records":12}}
//! ```

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "cliphist.jsonl";

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info";

/// Guard that must be kept alive for the duration of the program.
/// Dropping it flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize dual-output logging with the JSONL file under `log_dir`.
///
/// If the log file cannot be opened only the stderr layer is installed.
pub fn init(log_dir: &Path) -> LoggingGuard {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("[cliphist] Failed to create log directory: {}", e);
    }
    let log_path = log_path(log_dir);

    let file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("[cliphist] Failed to open log file {}: {}", log_path.display(), e);
            None
        }
    };

    // non-blocking so a slow disk never stalls the owner thread
    let (json_layer, file_guard) = match file {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let pretty_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .compact();

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
    {
        eprintln!("[cliphist] Logging already initialized: {}", e);
    }

    tracing::info!(
        event_type = "app_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        "Logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Path of the JSONL log file inside `log_dir`
pub fn log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

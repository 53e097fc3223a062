use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, warn};

/// How loudly a failure should be surfaced to the consumer layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,     // logged only
    Warning,  // advisory notification
    Error,    // operation failed
    Critical, // persistence may be incomplete
}

/// Failures of the durable history stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode history payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("history payload is corrupt: {0}")]
    Corrupt(String),

    #[error("primary store failed ({primary}); fallback store failed ({fallback})")]
    BothFailed {
        primary: Box<StoreError>,
        fallback: Box<StoreError>,
    },
}

impl StoreError {
    /// Lock contention and momentary I/O failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(failure, _)) => matches!(
                failure.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::SystemIoFailure
            ),
            Self::Io(_) => true,
            Self::Database(_) | Self::Encode(_) | Self::Corrupt(_) | Self::BothFailed { .. } => {
                false
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        if self.is_transient() {
            ErrorSeverity::Warning
        } else {
            ErrorSeverity::Critical
        }
    }
}

/// Failures of the asset directory
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("asset directory is unavailable")]
    Unavailable,

    #[error("path '{}' escapes the asset directory", .0.display())]
    OutsideDirectory(PathBuf),

    #[error("asset '{}' does not exist", .0.display())]
    Missing(PathBuf),

    #[error("asset I/O failed for '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AssetError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Unavailable => ErrorSeverity::Warning,
            Self::OutsideDirectory(_) => ErrorSeverity::Error,
            Self::Missing(_) => ErrorSeverity::Info,
            Self::Io { .. } => ErrorSeverity::Warning,
        }
    }
}

/// Errors returned by the history engine handle
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("clipboard history engine is not running")]
    Stopped,

    #[error("no history record with id {0}")]
    NotFound(crate::clipboard_history::RecordId),

    #[error("record {0} has no content that can be written back")]
    NothingToWrite(crate::clipboard_history::RecordId),

    #[error("pasteboard error: {0}")]
    Pasteboard(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("failed to start engine thread: {0}")]
    Thread(#[source] std::io::Error),
}

impl EngineError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Stopped => "Clipboard history is not running".to_string(),
            Self::NotFound(_) => "That clipboard item no longer exists".to_string(),
            Self::NothingToWrite(_) => "That clipboard item has no content to paste".to_string(),
            Self::Pasteboard(msg) => format!("Could not access the clipboard: {}", msg),
            Self::Store(e) => format!("Clipboard history storage issue: {}", e),
            Self::Asset(e) => format!("Clipboard history file issue: {}", e),
            Self::Thread(_) => "Clipboard history could not start".to_string(),
        }
    }
}

/// Extension trait for logging a failed result and continuing.
///
/// Includes the caller's file and line via `#[track_caller]`.
///
/// ```ignore
/// use clip_history::error::ResultExt;
///
/// let bytes = fs::read(&path).warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}

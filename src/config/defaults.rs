//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Default data directory name under the home directory
pub const DEFAULT_DATA_DIR_NAME: &str = ".cliphist";

/// Maximum number of unpinned records kept
pub const DEFAULT_MAX_HISTORY_COUNT: usize = 50;

/// Pasteboard polling
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_SELF_WRITE_GRACE_MS: u64 = 1000;

/// Hard ceiling for captured text (bytes); larger copies are rejected
pub const DEFAULT_MAX_TEXT_BYTES: usize = 10 * 1024 * 1024;

/// Orphaned asset collection
pub const DEFAULT_GC_INITIAL_DELAY_SECS: u64 = 30;
pub const DEFAULT_GC_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_ORPHAN_MIN_AGE_SECS: u64 = 60;

/// Store resilience
pub const DEFAULT_STORE_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_STORE_RETRY_DELAY_MS: u64 = 150;
pub const DEFAULT_FALLBACK_THROTTLE_SECS: u64 = 60;

/// File names below the data directory
pub const ASSETS_DIR_NAME: &str = "assets";
pub const DATABASE_FILE_NAME: &str = "history.sqlite";
pub const FALLBACK_FILE_NAME: &str = "fallback.json";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const LOG_DIR_NAME: &str = "logs";

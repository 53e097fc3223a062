//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;
use crate::clipboard_history::ResilienceOptions;

/// Settings for the clipboard history engine.
///
/// Every field has a default, so a partial (or empty) `config.json` is valid.
/// Interval fields set to 0 disable the corresponding timer, for embedders
/// that drive polling or collection themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Root for the database, fallback file, assets and logs (default: ~/.cliphist)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Maximum number of unpinned records (default: 50)
    #[serde(default = "default_max_history_count")]
    pub max_history_count: usize,
    /// Pasteboard polling interval (default: 500)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Window after our own write in which a change is not recorded (default: 1000)
    #[serde(default = "default_self_write_grace_ms")]
    pub self_write_grace_ms: u64,
    /// Texts larger than this are not captured (default: 10 MiB)
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: usize,
    /// Delay before the first orphan collection (default: 30)
    #[serde(default = "default_gc_initial_delay_secs")]
    pub gc_initial_delay_secs: u64,
    /// Period between orphan collections (default: 86400)
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,
    /// Orphans younger than this are left for the next pass (default: 60)
    #[serde(default = "default_orphan_min_age_secs")]
    pub orphan_min_age_secs: u64,
    /// Primary load attempts before switching to the fallback (default: 3)
    #[serde(default = "default_store_retry_attempts")]
    pub store_retry_attempts: u32,
    #[serde(default = "default_store_retry_delay_ms")]
    pub store_retry_delay_ms: u64,
    /// Minimum spacing of full fallback writes (default: 60)
    #[serde(default = "default_fallback_throttle_secs")]
    pub fallback_throttle_secs: u64,
}

fn default_max_history_count() -> usize {
    DEFAULT_MAX_HISTORY_COUNT
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_self_write_grace_ms() -> u64 {
    DEFAULT_SELF_WRITE_GRACE_MS
}
fn default_max_text_bytes() -> usize {
    DEFAULT_MAX_TEXT_BYTES
}
fn default_gc_initial_delay_secs() -> u64 {
    DEFAULT_GC_INITIAL_DELAY_SECS
}
fn default_gc_interval_secs() -> u64 {
    DEFAULT_GC_INTERVAL_SECS
}
fn default_orphan_min_age_secs() -> u64 {
    DEFAULT_ORPHAN_MIN_AGE_SECS
}
fn default_store_retry_attempts() -> u32 {
    DEFAULT_STORE_RETRY_ATTEMPTS
}
fn default_store_retry_delay_ms() -> u64 {
    DEFAULT_STORE_RETRY_DELAY_MS
}
fn default_fallback_throttle_secs() -> u64 {
    DEFAULT_FALLBACK_THROTTLE_SECS
}

/// ~/.cliphist, or a temp directory when there is no home
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_DATA_DIR_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join("cliphist"))
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_dir: None,
            max_history_count: DEFAULT_MAX_HISTORY_COUNT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            self_write_grace_ms: DEFAULT_SELF_WRITE_GRACE_MS,
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
            gc_initial_delay_secs: DEFAULT_GC_INITIAL_DELAY_SECS,
            gc_interval_secs: DEFAULT_GC_INTERVAL_SECS,
            orphan_min_age_secs: DEFAULT_ORPHAN_MIN_AGE_SECS,
            store_retry_attempts: DEFAULT_STORE_RETRY_ATTEMPTS,
            store_retry_delay_ms: DEFAULT_STORE_RETRY_DELAY_MS,
            fallback_throttle_secs: DEFAULT_FALLBACK_THROTTLE_SECS,
        }
    }
}

impl EngineConfig {
    /// Returns the data directory, tilde-expanded
    pub fn data_dir(&self) -> PathBuf {
        match self.data_dir.as_deref() {
            Some(raw) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
            None => default_data_dir(),
        }
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir().join(ASSETS_DIR_NAME)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(DATABASE_FILE_NAME)
    }

    pub fn fallback_path(&self) -> PathBuf {
        self.data_dir().join(FALLBACK_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join(LOG_DIR_NAME)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn self_write_grace(&self) -> Duration {
        Duration::from_millis(self.self_write_grace_ms)
    }

    pub fn gc_initial_delay(&self) -> Duration {
        Duration::from_secs(self.gc_initial_delay_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn orphan_min_age(&self) -> Duration {
        Duration::from_secs(self.orphan_min_age_secs)
    }

    pub fn resilience_options(&self) -> ResilienceOptions {
        ResilienceOptions {
            retry_attempts: self.store_retry_attempts.max(1),
            retry_delay: Duration::from_millis(self.store_retry_delay_ms),
            fallback_throttle: Duration::from_secs(self.fallback_throttle_secs),
        }
    }
}

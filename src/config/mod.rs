//! Configuration module - engine settings
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - `EngineConfig` and its derived paths/durations
//! - `loader` - File system loading and parsing

mod defaults;
mod loader;
mod types;

pub use defaults::{
    DEFAULT_MAX_HISTORY_COUNT, DEFAULT_MAX_TEXT_BYTES, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SELF_WRITE_GRACE_MS,
};
pub use loader::{default_config_path, load_config};
pub use types::EngineConfig;

#[cfg(test)]
pub use defaults::{
    DEFAULT_FALLBACK_THROTTLE_SECS, DEFAULT_GC_INITIAL_DELAY_SECS, DEFAULT_GC_INTERVAL_SECS,
    DEFAULT_STORE_RETRY_ATTEMPTS,
};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

//! Configuration loading from file system

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::defaults::CONFIG_FILE_NAME;
use super::types::{default_data_dir, EngineConfig};

/// Default location of the config file (~/.cliphist/config.json)
pub fn default_config_path() -> PathBuf {
    default_data_dir().join(CONFIG_FILE_NAME)
}

/// Load configuration from a JSON file.
///
/// Returns `EngineConfig::default()` if the file is missing, unreadable or
/// malformed. Never fails.
#[instrument(name = "load_config", skip_all, fields(path = %path.display()))]
pub fn load_config(path: &Path) -> EngineConfig {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("Config file not found, using defaults");
            return EngineConfig::default();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read config file, using defaults");
            return EngineConfig::default();
        }
    };

    match serde_json::from_str::<EngineConfig>(&contents) {
        Ok(config) => {
            info!("Successfully loaded config");
            config
        }
        Err(e) => {
            let hint = if e.to_string().contains("invalid type") {
                "\n\nHint: numeric settings must be plain numbers, e.g. \"maxHistoryCount\": 100"
            } else if e.is_syntax() || e.is_eof() {
                "\n\nHint: config.json must be a single JSON object, e.g. { \"pollIntervalMs\": 250 }"
            } else {
                ""
            };
            warn!(
                error = %e,
                hint = %hint,
                "Failed to parse config JSON, using defaults"
            );
            EngineConfig::default()
        }
    }
}

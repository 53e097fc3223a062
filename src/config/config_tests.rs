use super::*;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = EngineConfig::default();
    assert_eq!(config.max_history_count, DEFAULT_MAX_HISTORY_COUNT);
    assert_eq!(config.poll_interval(), Duration::from_millis(500));
    assert_eq!(config.self_write_grace(), Duration::from_millis(1000));
    assert_eq!(config.max_text_bytes, DEFAULT_MAX_TEXT_BYTES);
    assert_eq!(config.gc_initial_delay_secs, DEFAULT_GC_INITIAL_DELAY_SECS);
    assert_eq!(config.gc_interval(), Duration::from_secs(DEFAULT_GC_INTERVAL_SECS));
    assert_eq!(config.data_dir, None);
}

#[test]
fn test_empty_object_uses_defaults() {
    let config: EngineConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn test_partial_config_keeps_other_defaults() {
    let json = r#"{"maxHistoryCount": 200, "pollIntervalMs": 250, "dataDir": "/tmp/clips"}"#;
    let config: EngineConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.max_history_count, 200);
    assert_eq!(config.poll_interval_ms, 250);
    assert_eq!(config.data_dir(), PathBuf::from("/tmp/clips"));
    assert_eq!(config.self_write_grace_ms, DEFAULT_SELF_WRITE_GRACE_MS);
    assert_eq!(config.store_retry_attempts, DEFAULT_STORE_RETRY_ATTEMPTS);
}

#[test]
fn test_config_serialization_is_camel_case() {
    let config = EngineConfig {
        data_dir: Some("/data".to_string()),
        max_history_count: 7,
        ..EngineConfig::default()
    };

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"maxHistoryCount\":7"));
    assert!(json.contains("\"dataDir\":\"/data\""));

    let deserialized: EngineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, config);
}

#[test]
fn test_derived_paths() {
    let config = EngineConfig {
        data_dir: Some("/data".to_string()),
        ..EngineConfig::default()
    };
    assert_eq!(config.assets_dir(), PathBuf::from("/data/assets"));
    assert_eq!(config.database_path(), PathBuf::from("/data/history.sqlite"));
    assert_eq!(config.fallback_path(), PathBuf::from("/data/fallback.json"));
    assert_eq!(config.log_dir(), PathBuf::from("/data/logs"));
}

#[test]
fn test_default_data_dir() {
    let dir = EngineConfig::default().data_dir();
    assert!(dir.ends_with(".cliphist") || dir.ends_with("cliphist"));
}

#[test]
fn test_tilde_is_expanded() {
    let config = EngineConfig {
        data_dir: Some("~/clips".to_string()),
        ..EngineConfig::default()
    };
    let dir = config.data_dir();
    assert!(!dir.to_string_lossy().starts_with('~'));
    assert!(dir.ends_with("clips"));
}

#[test]
fn test_resilience_options() {
    let config = EngineConfig {
        store_retry_attempts: 0,
        ..EngineConfig::default()
    };
    let options = config.resilience_options();
    assert_eq!(options.retry_attempts, 1);
    assert_eq!(
        options.fallback_throttle,
        Duration::from_secs(DEFAULT_FALLBACK_THROTTLE_SECS)
    );
}

#[test]
fn test_load_missing_file_returns_defaults() {
    let temp = TempDir::new().unwrap();
    let config = load_config(&temp.path().join("config.json"));
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn test_load_malformed_file_returns_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(&path, "{ maxHistoryCount: ").unwrap();
    assert_eq!(load_config(&path), EngineConfig::default());

    std::fs::write(&path, r#"{"maxHistoryCount": "lots"}"#).unwrap();
    assert_eq!(load_config(&path), EngineConfig::default());
}

#[test]
fn test_load_valid_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(&path, r#"{"maxHistoryCount": 12, "selfWriteGraceMs": 300}"#).unwrap();

    let config = load_config(&path);
    assert_eq!(config.max_history_count, 12);
    assert_eq!(config.self_write_grace(), Duration::from_millis(300));
}

#[test]
fn test_default_config_path() {
    assert!(default_config_path().ends_with("config.json"));
}

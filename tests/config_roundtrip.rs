//! Config file load/save tests against real temp files.

use panhub::AppConfig;

#[test]
fn save_then_load_preserves_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("config.toml");

    let mut config = AppConfig::default();
    config.search.plugin_timeout_ms = 1234;
    config.search.default_channels = vec!["alpha".into()];
    config.cache.max_items = 42;
    config.breaker.failure_threshold = 7;
    config.save_to_file(&path).expect("save");

    let loaded = AppConfig::from_file(&path).expect("load");
    assert_eq!(loaded.search.plugin_timeout_ms, 1234);
    assert_eq!(loaded.search.default_channels, vec!["alpha"]);
    assert_eq!(loaded.cache.max_items, 42);
    assert_eq!(loaded.breaker.failure_threshold, 7);
}

#[test]
fn missing_file_means_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let loaded = AppConfig::load_or_default(&dir.path().join("absent.toml")).expect("defaults");
    assert_eq!(loaded.search.default_concurrency, 10);
}

#[test]
fn from_file_nonexistent_returns_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(AppConfig::from_file(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn invalid_toml_returns_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "this is not valid toml {{{").expect("write");
    let err = AppConfig::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("config error"));
}

#[test]
fn invalid_values_rejected_on_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("zero.toml");
    std::fs::write(&path, "[search]\nplugin_timeout_ms = 0\n").expect("write");
    let err = AppConfig::load_or_default(&path).unwrap_err();
    assert!(err.to_string().contains("plugin_timeout_ms"));
}

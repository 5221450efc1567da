// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tempfile::TempDir;
use yare::parameterized;

#[test]
fn empty_file_gives_defaults() {
    let config: ClientConfig = toml::from_str("").unwrap();
    assert_eq!(config, ClientConfig::default());
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.heartbeat_interval_ms, 30_000);
    assert_eq!(config.heartbeat_timeout_ms, 60_000);
    assert_eq!(config.operation_deadline_ms, 5_000);
    assert_eq!(config.retry_initial_delay_ms, 500);
    assert_eq!(config.retry_max_delay_ms, 30_000);
}

#[test]
fn missing_file_gives_defaults() {
    let temp = TempDir::new().unwrap();
    let config = ClientConfig::load(&temp.path().join("absent.toml")).unwrap();
    assert_eq!(config, ClientConfig::default());
}

#[test]
fn save_then_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("mesa").join("config.toml");
    let config = ClientConfig {
        url: Some("wss://tabletop.example/s".into()),
        user: "gm".into(),
        max_retries: 5,
        snapshot_path: Some(temp.path().join("snap.json")),
        ..ClientConfig::default()
    };

    config.save(&path).unwrap();
    assert_eq!(ClientConfig::load(&path).unwrap(), config);
}

#[test]
fn partial_file_keeps_other_defaults() {
    let config: ClientConfig = toml::from_str("user = \"ana\"\nmax_retries = 1\n").unwrap();
    assert_eq!(config.user, "ana");
    assert_eq!(config.max_retries, 1);
    assert_eq!(config.connect_timeout_ms, 10_000);
}

#[test]
fn load_rejects_bad_url() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "url = \"http://example\"\n").unwrap();
    assert!(matches!(
        ClientConfig::load(&path).unwrap_err(),
        ConfigError::InvalidUrl(_)
    ));
}

#[test]
fn load_rejects_bad_toml() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "max_retries = \"many\"\n").unwrap();
    assert!(matches!(
        ClientConfig::load(&path).unwrap_err(),
        ConfigError::Parse(_)
    ));
}

#[test]
fn explicit_snapshot_path_wins() {
    let config = ClientConfig {
        snapshot_path: Some(PathBuf::from("/tmp/s.json")),
        ..ClientConfig::default()
    };
    assert_eq!(config.snapshot_path().unwrap(), PathBuf::from("/tmp/s.json"));
}

#[parameterized(
    ws = { "ws://localhost:7890", true },
    wss = { "wss://tabletop.example/session", true },
    http = { "http://localhost", false },
    bare = { "localhost:7890", false },
    no_host = { "ws://", false },
    path_only = { "wss:///session", false },
)]
fn url_validation(url: &str, valid: bool) {
    assert_eq!(validate_url(url).is_ok(), valid);
}

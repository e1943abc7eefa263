use serde_json::json;
use tempfile::TempDir;

use mcphub_core::config::{ConfigStore, FileConfigStore, Settings, paths};
use mcphub_core::types::AgentFamily;

#[test]
fn missing_settings_file_yields_defaults() {
    let temp = TempDir::new().unwrap();
    let settings = Settings::load(&paths::settings_path(temp.path())).unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
fn settings_file_overrides_selected_values() {
    let temp = TempDir::new().unwrap();
    let path = paths::settings_path(temp.path());
    std::fs::write(
        &path,
        r#"
[timeouts]
agent_budget_secs = 60

[agents.qwen]
cli_path = "/opt/qwen/bin/qwen"
"#,
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.timeouts.agent_budget_secs, 60);
    assert_eq!(settings.timeouts.install_secs, 300);
    assert_eq!(settings.cli_path(AgentFamily::Qwen), Some("/opt/qwen/bin/qwen"));
}

#[test]
fn broken_settings_file_names_path_and_line() {
    let temp = TempDir::new().unwrap();
    let path = paths::settings_path(temp.path());
    std::fs::write(&path, "[detection]\nattempts = 3\nfetch_tools = maybe\n").unwrap();

    let err = format!("{:#}", Settings::load(&path).unwrap_err());
    assert!(err.contains("mcphub.toml"), "unexpected error: {err}");
    assert!(err.contains("line 3"), "unexpected error: {err}");
}

#[test]
fn zero_timeout_fails_validation() {
    let temp = TempDir::new().unwrap();
    let path = paths::settings_path(temp.path());
    std::fs::write(&path, "[timeouts]\nhandshake_secs = 0\n").unwrap();

    let err = format!("{:#}", Settings::load(&path).unwrap_err());
    assert!(err.contains("handshake_secs"));
}

#[test]
fn file_store_round_trips_and_keeps_other_keys() {
    let temp = TempDir::new().unwrap();
    let store = FileConfigStore::new(temp.path().join("nested").join("store.json"));

    assert_eq!(store.get("mcpServers").unwrap(), None);
    store.set("theme", json!("dark")).unwrap();
    store.set("mcpServers", json!([])).unwrap();

    let reopened = FileConfigStore::new(store.path().to_path_buf());
    assert_eq!(reopened.get("theme").unwrap(), Some(json!("dark")));
    assert_eq!(reopened.get("mcpServers").unwrap(), Some(json!([])));
}

#[test]
fn file_store_rejects_non_object_root() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.json");
    std::fs::write(&path, "[1, 2]").unwrap();

    let store = FileConfigStore::new(path);
    assert!(store.get("anything").is_err());
}

mod support;

use std::sync::Arc;

use tempfile::TempDir;

use mcphub_core::client::LOCAL_SERVERS_KEY;
use mcphub_core::config::{ConfigStore, MemoryConfigStore, Settings, paths};
use mcphub_core::context::AppContext;
use mcphub_core::oauth::{FileTokenStore, StoredCredentials, TokenStore};
use mcphub_core::types::{AgentDescriptor, AgentFamily};
use support::{FixedPathProbe, ScriptedRunner, stdio_server};

fn context(temp: &TempDir, runner: Arc<ScriptedRunner>) -> AppContext {
    let mut settings = Settings::default();
    settings.detection.retry_delay_ms = 1;
    settings.detection.fetch_tools = false;
    AppContext::with_services(
        temp.path().to_path_buf(),
        settings,
        runner,
        Arc::new(FixedPathProbe(vec![])),
        Arc::new(MemoryConfigStore::new()),
        Arc::new(FileTokenStore::new(paths::token_path(temp.path()))),
    )
    .unwrap()
}

#[test]
fn context_exposes_settings_and_paths() {
    let temp = TempDir::new().unwrap();
    let ctx = context(&temp, Arc::new(ScriptedRunner::new()));

    assert_eq!(ctx.config_dir(), temp.path());
    assert!(!ctx.settings().detection.fetch_tools);
    assert_eq!(ctx.registry().families(), AgentFamily::ALL.to_vec());
}

#[tokio::test]
async fn local_agent_shares_the_context_store() {
    let temp = TempDir::new().unwrap();
    let ctx = context(&temp, Arc::new(ScriptedRunner::new()));

    let result = ctx
        .coordinator()
        .sync_to_agents(
            &[stdio_server("docs", "npx", &["docs-mcp"])],
            &[AgentDescriptor::new(AgentFamily::Local)],
        )
        .await;

    assert!(result.success);
    assert!(ctx.config_store().get(LOCAL_SERVERS_KEY).unwrap().is_some());
}

#[tokio::test]
async fn detection_goes_through_the_injected_runner() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new().with_fallback(|_| None));
    let ctx = context(&temp, runner.clone());

    let results = ctx
        .coordinator()
        .detect_across_agents(&[AgentDescriptor::new(AgentFamily::Codex)])
        .await;

    assert!(results.is_empty());
    assert_eq!(runner.calls()[0].program, "codex");
}

#[test]
fn oauth_uses_the_injected_token_store() {
    let temp = TempDir::new().unwrap();
    let tokens = FileTokenStore::new(paths::token_path(temp.path()));
    tokens
        .save_credentials(
            "notion",
            StoredCredentials {
                access_token: "t".to_string(),
                refresh_token: None,
                token_type: None,
                expires_at: None,
            },
        )
        .unwrap();

    let ctx = context(&temp, Arc::new(ScriptedRunner::new()));
    assert_eq!(ctx.oauth().authenticated_servers(), vec!["notion"]);
}

//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;

use crate::client::AdapterRegistry;
use crate::config::{ConfigStore, FileConfigStore, Settings, paths};
use crate::coordinator::Coordinator;
use crate::oauth::{FileTokenStore, OAuthService, TokenStore};
use crate::probe::{ConnectionTester, ProbeSettings, TransportProbe};
use crate::runtime::{CommandRunner, PathProbe, SystemPathProbe, SystemRunner};

/// Process-scoped services.
///
/// Frontends create this once at startup and hand out references; every
/// caller shares the same adapters (and therefore the same per-agent queues),
/// the same coordinator and the same OAuth service.
pub struct AppContext {
    config_dir: PathBuf,
    settings: Settings,
    runner: Arc<dyn CommandRunner>,
    tester: Arc<dyn ConnectionTester>,
    store: Arc<dyn ConfigStore>,
    registry: Arc<AdapterRegistry>,
    coordinator: Coordinator,
    oauth: OAuthService,
}

impl AppContext {
    /// Load settings from `<config_dir>/mcphub/mcphub.toml` and build the
    /// default services.
    pub fn load() -> anyhow::Result<Self> {
        let config_dir = paths::app_config_dir()?;
        let settings = Settings::load(&paths::settings_path(&config_dir))?;
        Self::new(config_dir, settings)
    }

    /// Create a context rooted at an explicit config directory.
    pub fn new(config_dir: PathBuf, settings: Settings) -> anyhow::Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let path_probe: Arc<dyn PathProbe> =
            Arc::new(SystemPathProbe::new(settings.timeouts.path_probe()));
        let store: Arc<dyn ConfigStore> =
            Arc::new(FileConfigStore::new(paths::store_path(&config_dir)));
        let tokens: Arc<dyn TokenStore> =
            Arc::new(FileTokenStore::new(paths::token_path(&config_dir)));
        Self::with_services(config_dir, settings, runner, path_probe, store, tokens)
    }

    /// Create a context from explicit collaborators (for testing).
    pub fn with_services(
        config_dir: PathBuf,
        settings: Settings,
        runner: Arc<dyn CommandRunner>,
        path_probe: Arc<dyn PathProbe>,
        store: Arc<dyn ConfigStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> anyhow::Result<Self> {
        // Bounds every request, including ones outside a handshake timeout.
        let http = reqwest::Client::builder()
            .user_agent(concat!("mcphub/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(settings.timeouts.handshake())
            .timeout(settings.timeouts.handshake())
            .build()
            .context("Failed to build HTTP client")?;
        let tester: Arc<dyn ConnectionTester> = Arc::new(TransportProbe::new(
            http.clone(),
            runner.clone(),
            ProbeSettings {
                handshake_timeout: settings.timeouts.handshake(),
                cache_clean_timeout: settings.timeouts.cache_clean(),
            },
        ));
        let registry = Arc::new(AdapterRegistry::with_default_agents(
            &settings,
            runner.clone(),
            tester.clone(),
            store.clone(),
        ));
        let coordinator = Coordinator::new(
            registry.clone(),
            path_probe,
            settings.timeouts.agent_budget(),
        );
        let oauth = OAuthService::new(http, tokens).with_timeout(settings.timeouts.handshake());

        Ok(Self {
            config_dir,
            settings,
            runner,
            tester,
            store,
            registry,
            coordinator,
            oauth,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn tester(&self) -> &Arc<dyn ConnectionTester> {
        &self.tester
    }

    pub fn config_store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn oauth(&self) -> &OAuthService {
        &self.oauth
    }

    /// Mutable access, e.g. to attach an OAuth provider at startup.
    pub fn oauth_mut(&mut self) -> &mut OAuthService {
        &mut self.oauth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentFamily;
    use tempfile::TempDir;

    #[test]
    fn context_builds_default_registry() {
        let temp = TempDir::new().unwrap();
        let ctx = AppContext::new(temp.path().to_path_buf(), Settings::default()).unwrap();

        assert_eq!(ctx.config_dir(), temp.path());
        assert_eq!(ctx.registry().families(), AgentFamily::ALL.to_vec());
        assert!(ctx.oauth().authenticated_servers().is_empty());
    }
}

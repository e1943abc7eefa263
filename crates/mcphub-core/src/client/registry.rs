//! Registry of agent adapters, one per family.
//!
//! Built once by the application context; the coordinator looks adapters up
//! here so every caller shares the same adapter and therefore the same
//! operation queue.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    AgentAdapter, AgentSettings, CliAgent, CliProfile, LocalAgent, claude_code::ClaudeCodeProfile,
    codex::CodexProfile, gemini_cli::GeminiFamilyProfile,
};
use crate::config::{ConfigStore, Settings};
use crate::probe::ConnectionTester;
use crate::runtime::CommandRunner;
use crate::types::AgentFamily;

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<AgentFamily, Arc<dyn AgentAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with an adapter for every family that is not
    /// disabled in `settings`.
    pub fn with_default_agents(
        settings: &Settings,
        runner: Arc<dyn CommandRunner>,
        tester: Arc<dyn ConnectionTester>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        let mut registry = Self::new();
        let profiles: Vec<Box<dyn CliProfile>> = vec![
            Box::new(ClaudeCodeProfile::new()),
            Box::new(GeminiFamilyProfile::gemini()),
            Box::new(GeminiFamilyProfile::qwen()),
            Box::new(GeminiFamilyProfile::iflow()),
            Box::new(CodexProfile::new()),
        ];
        for profile in profiles {
            let family = profile.family();
            if !settings.agent_enabled(family) {
                tracing::debug!(agent = %family, "agent disabled in settings");
                continue;
            }
            registry.register(Arc::new(CliAgent::new(
                profile,
                runner.clone(),
                tester.clone(),
                AgentSettings::from_settings(settings, family),
            )));
        }
        if settings.agent_enabled(AgentFamily::Local) {
            registry.register(Arc::new(LocalAgent::new(store, tester)));
        }
        registry
    }

    /// Register an adapter, replacing any previous one for its family.
    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) {
        self.adapters.insert(adapter.backend(), adapter);
    }

    pub fn get(&self, family: AgentFamily) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters.get(&family).cloned()
    }

    /// Any adapter; all share the same connection tester.
    pub fn any(&self) -> Option<Arc<dyn AgentAdapter>> {
        self.adapters.values().next().cloned()
    }

    pub fn families(&self) -> Vec<AgentFamily> {
        self.adapters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

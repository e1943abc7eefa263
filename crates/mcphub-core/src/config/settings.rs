//! `mcphub.toml`: timeouts, detection policy and per-agent overrides.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::parser;
use crate::types::AgentFamily;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub timeouts: Timeouts,
    pub detection: DetectionSettings,
    /// Keyed by agent id (`claude`, `gemini`, ...).
    pub agents: BTreeMap<String, AgentOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub path_probe_ms: u64,
    pub metadata_secs: u64,
    pub install_secs: u64,
    pub handshake_secs: u64,
    pub cache_clean_secs: u64,
    pub agent_budget_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            path_probe_ms: 1000,
            metadata_secs: 10,
            install_secs: 300,
            handshake_secs: 30,
            cache_clean_secs: 10,
            agent_budget_secs: 330,
        }
    }
}

impl Timeouts {
    pub fn path_probe(&self) -> Duration {
        Duration::from_millis(self.path_probe_ms)
    }

    pub fn metadata(&self) -> Duration {
        Duration::from_secs(self.metadata_secs)
    }

    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install_secs)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn cache_clean(&self) -> Duration {
        Duration::from_secs(self.cache_clean_secs)
    }

    pub fn agent_budget(&self) -> Duration {
        Duration::from_secs(self.agent_budget_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub attempts: u32,
    pub retry_delay_ms: u64,
    /// Test connected servers after listing them to fill their tool lists.
    pub fetch_tools: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay_ms: 500,
            fetch_tools: true,
        }
    }
}

impl DetectionSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentOverride {
    pub cli_path: Option<String>,
    pub enabled: bool,
}

impl Default for AgentOverride {
    fn default() -> Self {
        Self {
            cli_path: None,
            enabled: true,
        }
    }
}

impl Settings {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        parser::parse_settings(path)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.detection.attempts == 0 {
            anyhow::bail!("detection.attempts must be at least 1");
        }
        let timeouts = [
            ("path_probe_ms", self.timeouts.path_probe_ms),
            ("metadata_secs", self.timeouts.metadata_secs),
            ("install_secs", self.timeouts.install_secs),
            ("handshake_secs", self.timeouts.handshake_secs),
            ("cache_clean_secs", self.timeouts.cache_clean_secs),
            ("agent_budget_secs", self.timeouts.agent_budget_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                anyhow::bail!("timeouts.{} must be greater than zero", name);
            }
        }
        for id in self.agents.keys() {
            id.parse::<AgentFamily>()
                .map_err(|e| anyhow::anyhow!("Invalid [agents.{}] section: {}", id, e))?;
        }
        Ok(())
    }

    /// Override for a family, if one is configured.
    pub fn agent(&self, family: AgentFamily) -> Option<&AgentOverride> {
        self.agents.iter().find_map(|(id, entry)| {
            (id.parse::<AgentFamily>().ok() == Some(family)).then_some(entry)
        })
    }

    pub fn agent_enabled(&self, family: AgentFamily) -> bool {
        self.agent(family).is_none_or(|entry| entry.enabled)
    }

    pub fn cli_path(&self, family: AgentFamily) -> Option<&str> {
        self.agent(family).and_then(|entry| entry.cli_path.as_deref())
    }
}

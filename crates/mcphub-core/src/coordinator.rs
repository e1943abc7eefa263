//! Fan-out of detection, sync and removal across agents.
//!
//! Different agents run concurrently; operations against the same agent are
//! serialized by that agent's adapter queue. Nothing here returns an error:
//! per-agent failures are folded into the aggregate result.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::client::{AdapterRegistry, AgentAdapter, OperationResult};
use crate::mcp::{DetectionResult, McpServer};
use crate::probe::ConnectionTestResult;
use crate::runtime::PathProbe;
use crate::types::{AgentDescriptor, AgentFamily};

/// Binary whose presence on PATH adds the native Gemini CLI to detection.
const NATIVE_GEMINI_BINARY: &str = "gemini";

/// Outcome of one agent within a sync or remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutcome {
    pub agent: AgentFamily,
    pub name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentOutcome {
    fn from_result(descriptor: &AgentDescriptor, result: OperationResult) -> Self {
        Self {
            agent: descriptor.backend,
            name: descriptor.name.clone(),
            success: result.success,
            error: result.error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub results: Vec<AgentOutcome>,
}

impl SyncResult {
    pub fn empty() -> Self {
        Self {
            success: true,
            results: Vec::new(),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &AgentOutcome> {
        self.results.iter().filter(|outcome| !outcome.success)
    }
}

pub struct Coordinator {
    registry: Arc<AdapterRegistry>,
    path_probe: Arc<dyn PathProbe>,
    agent_budget: Duration,
}

impl Coordinator {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        path_probe: Arc<dyn PathProbe>,
        agent_budget: Duration,
    ) -> Self {
        Self {
            registry,
            path_probe,
            agent_budget,
        }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Detect configured servers on every agent in parallel. Agents that
    /// report nothing, fail, or exceed the time budget are left out.
    pub async fn detect_across_agents(&self, agents: &[AgentDescriptor]) -> Vec<DetectionResult> {
        let effective = self.detection_targets(agents).await;

        let tasks = effective.into_iter().filter_map(|descriptor| {
            let adapter = self.registry.get(descriptor.backend)?;
            Some(async move {
                let family = descriptor.backend;
                let detect = adapter.detect(descriptor.cli_path.as_deref());
                match tokio::time::timeout(self.agent_budget, detect).await {
                    Ok(servers) => DetectionResult::from_servers(family, servers),
                    Err(_) => {
                        tracing::warn!(
                            agent = %family,
                            budget = ?self.agent_budget,
                            "detection exceeded the time budget"
                        );
                        None
                    }
                }
            })
        });

        join_all(tasks).await.into_iter().flatten().collect()
    }

    /// Install the enabled servers into every agent in parallel.
    pub async fn sync_to_agents(
        &self,
        servers: &[McpServer],
        agents: &[AgentDescriptor],
    ) -> SyncResult {
        let enabled: Vec<McpServer> = servers.iter().filter(|s| s.enabled).cloned().collect();
        if enabled.is_empty() {
            return SyncResult::empty();
        }

        let enabled = &enabled;
        let results = self
            .fan_out(agents, |adapter, cli_path| async move {
                adapter.install_with(enabled, cli_path.as_deref()).await
            })
            .await;
        let success = results.iter().all(|outcome| outcome.success);
        SyncResult { success, results }
    }

    /// Remove a server by name from every agent. Removal is best effort, so
    /// the aggregate always reports success; failures stay visible per agent.
    pub async fn remove_from_agents(&self, name: &str, agents: &[AgentDescriptor]) -> SyncResult {
        let results = self
            .fan_out(agents, |adapter, cli_path| async move {
                adapter.remove_with(name, cli_path.as_deref()).await
            })
            .await;
        for outcome in results.iter().filter(|outcome| !outcome.success) {
            tracing::warn!(
                agent = %outcome.agent,
                server = %name,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "removal failed"
            );
        }
        SyncResult {
            success: true,
            results,
        }
    }

    /// Test a server through any adapter; the test engine is shared.
    pub async fn test_connection(&self, server: &McpServer) -> ConnectionTestResult {
        match self.registry.any() {
            Some(adapter) => adapter.test_connection(&server.transport).await,
            None => ConnectionTestResult::failed("No agent adapters are registered"),
        }
    }

    async fn fan_out<F, Fut>(&self, agents: &[AgentDescriptor], op: F) -> Vec<AgentOutcome>
    where
        F: Fn(Arc<dyn AgentAdapter>, Option<String>) -> Fut,
        Fut: Future<Output = OperationResult>,
    {
        let tasks = dedupe(agents).into_iter().map(|descriptor| {
            let adapter = self.registry.get(descriptor.backend);
            let run = adapter.map(|adapter| op(adapter, descriptor.cli_path.clone()));
            async move {
                let Some(run) = run else {
                    tracing::debug!(agent = %descriptor.backend, "no adapter registered; skipping");
                    return AgentOutcome::from_result(&descriptor, OperationResult::ok());
                };
                let result = match tokio::time::timeout(self.agent_budget, run).await {
                    Ok(result) => result,
                    Err(_) => OperationResult::failed(format!(
                        "{} did not finish within {:?}",
                        descriptor.name, self.agent_budget
                    )),
                };
                AgentOutcome::from_result(&descriptor, result)
            }
        });
        join_all(tasks).await
    }

    /// Drop embedded entries, add the native Gemini CLI when it is installed
    /// but not listed, and collapse duplicates.
    async fn detection_targets(&self, agents: &[AgentDescriptor]) -> Vec<AgentDescriptor> {
        let mut effective: Vec<AgentDescriptor> = agents
            .iter()
            .filter(|descriptor| {
                if descriptor.embedded {
                    tracing::debug!(
                        agent = %descriptor.backend,
                        name = %descriptor.name,
                        "skipping embedded agent; its servers belong to the local agent"
                    );
                }
                !descriptor.embedded
            })
            .cloned()
            .collect();

        let gemini_listed = effective
            .iter()
            .any(|descriptor| descriptor.backend == AgentFamily::GeminiCli);
        if !gemini_listed
            && self.registry.get(AgentFamily::GeminiCli).is_some()
            && self.path_probe.exists(NATIVE_GEMINI_BINARY).await
        {
            tracing::debug!("native gemini CLI found on PATH");
            effective.push(AgentDescriptor::new(AgentFamily::GeminiCli));
        }

        dedupe(&effective)
    }
}

/// Keep the first entry per family so no agent runs the same operation twice.
fn dedupe(agents: &[AgentDescriptor]) -> Vec<AgentDescriptor> {
    let mut seen = BTreeSet::new();
    agents
        .iter()
        .filter(|descriptor| seen.insert(descriptor.backend))
        .cloned()
        .collect()
}

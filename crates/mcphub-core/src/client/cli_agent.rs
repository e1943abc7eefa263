//! Generic adapter for agents managed through their own CLI.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{AgentAdapter, CliProfile, OperationQueue, OperationResult};
use crate::config::{DetectionSettings, Settings};
use crate::error::AgentError;
use crate::mcp::{McpServer, ServerTransport};
use crate::parse;
use crate::probe::{ConnectionTestResult, ConnectionTester};
use crate::runtime::{CommandOutput, CommandRunner, CommandSpec};
use crate::types::{AgentFamily, TransportKind};

/// Knobs for one CLI agent, usually derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Binary used when a call does not pass its own CLI path.
    pub cli_path: Option<String>,
    /// Root for the fallback config file (`~/.claude.json`, ...).
    pub home_dir: Option<PathBuf>,
    pub metadata_timeout: Duration,
    pub install_timeout: Duration,
    pub detection: DetectionSettings,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), AgentFamily::Local)
    }
}

impl AgentSettings {
    pub fn from_settings(settings: &Settings, family: AgentFamily) -> Self {
        Self {
            cli_path: settings.cli_path(family).map(str::to_string),
            home_dir: dirs::home_dir(),
            metadata_timeout: settings.timeouts.metadata(),
            install_timeout: settings.timeouts.install(),
            detection: settings.detection.clone(),
        }
    }
}

/// [`AgentAdapter`] for a CLI-managed agent. Every public operation goes
/// through the adapter's [`OperationQueue`].
pub struct CliAgent {
    inner: Arc<Inner>,
    queue: OperationQueue,
}

struct Inner {
    profile: Box<dyn CliProfile>,
    runner: Arc<dyn CommandRunner>,
    tester: Arc<dyn ConnectionTester>,
    settings: AgentSettings,
}

impl CliAgent {
    pub fn new(
        profile: Box<dyn CliProfile>,
        runner: Arc<dyn CommandRunner>,
        tester: Arc<dyn ConnectionTester>,
        settings: AgentSettings,
    ) -> Self {
        let queue = OperationQueue::new(profile.family().id());
        Self {
            inner: Arc::new(Inner {
                profile,
                runner,
                tester,
                settings,
            }),
            queue,
        }
    }
}

#[async_trait]
impl AgentAdapter for CliAgent {
    fn backend(&self) -> AgentFamily {
        self.inner.profile.family()
    }

    fn supported_transports(&self) -> &'static [TransportKind] {
        self.inner.profile.supported_transports()
    }

    async fn detect(&self, cli_path: Option<&str>) -> Vec<McpServer> {
        let inner = self.inner.clone();
        let cli_path = cli_path.map(str::to_string);
        let fetch_tools = inner.settings.detection.fetch_tools;
        self.queue
            .run(async move { inner.detect(cli_path.as_deref(), fetch_tools).await })
            .await
            .unwrap_or_else(|err| {
                tracing::error!(agent = %self.backend(), error = %err, "detection could not run");
                Vec::new()
            })
    }

    async fn install_with(&self, servers: &[McpServer], cli_path: Option<&str>) -> OperationResult {
        let inner = self.inner.clone();
        let servers = servers.to_vec();
        let cli_path = cli_path.map(str::to_string);
        match self
            .queue
            .run(async move { inner.install(&servers, cli_path.as_deref()).await })
            .await
        {
            Ok(()) => OperationResult::ok(),
            Err(err) => OperationResult::failed(err.to_string()),
        }
    }

    async fn remove_with(&self, name: &str, cli_path: Option<&str>) -> OperationResult {
        let inner = self.inner.clone();
        let name = name.to_string();
        let cli_path = cli_path.map(str::to_string);
        match self
            .queue
            .run(async move { inner.remove(&name, cli_path.as_deref()).await })
            .await
        {
            Ok(Ok(())) => OperationResult::ok(),
            Ok(Err(err)) => OperationResult::failed(err.to_string()),
            Err(err) => OperationResult::failed(err.to_string()),
        }
    }

    async fn test_connection(&self, transport: &ServerTransport) -> ConnectionTestResult {
        let tester = self.inner.tester.clone();
        let transport = transport.clone();
        self.queue
            .run(async move { tester.test(&transport).await })
            .await
            .unwrap_or_else(|err| ConnectionTestResult::failed(err.to_string()))
    }
}

impl Inner {
    fn family(&self) -> AgentFamily {
        self.profile.family()
    }

    fn binary(&self, cli_path: Option<&str>) -> String {
        cli_path
            .or(self.settings.cli_path.as_deref())
            .or(self.family().default_binary())
            .unwrap_or_default()
            .to_string()
    }

    /// Run a command; a non-zero exit becomes [`AgentError::Command`].
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, AgentError> {
        let output = self.runner.run(spec).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(AgentError::Command {
                program: spec.program.clone(),
                code: output.code,
                stderr: output.combined().trim().to_string(),
            })
        }
    }

    /// List, parse and optionally enrich. Only truncated output is retried;
    /// every other failure degrades to "no servers".
    async fn detect(&self, cli_path: Option<&str>, fetch_tools: bool) -> Vec<McpServer> {
        let family = self.family();
        let bin = self.binary(cli_path);
        let policy = &self.settings.detection;
        let spec = self
            .profile
            .list_command(&bin)
            .timeout(self.settings.metadata_timeout);

        for attempt in 1..=policy.attempts {
            if attempt > 1 {
                tokio::time::sleep(policy.retry_delay()).await;
            }

            let output = match self.runner.run(&spec).await {
                Ok(output) => output,
                Err(err) => {
                    tracing::debug!(agent = %family, error = %err, "could not list servers");
                    return Vec::new();
                }
            };
            let listing = if output.stdout.trim().is_empty() {
                &output.stderr
            } else {
                &output.stdout
            };

            match parse::parse_cli_output(family, listing) {
                Ok(mut servers) => {
                    if fetch_tools {
                        parse::enrich_with_tools(&mut servers, self.tester.as_ref()).await;
                    }
                    tracing::debug!(agent = %family, count = servers.len(), attempt, "detected servers");
                    return servers;
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(agent = %family, attempt, error = %err, "listing looks truncated");
                }
                Err(err) => {
                    tracing::warn!(agent = %family, error = %err, "could not parse listing");
                    return Vec::new();
                }
            }
        }

        tracing::warn!(
            agent = %family,
            attempts = policy.attempts,
            "giving up on detection after repeated truncated output"
        );
        Vec::new()
    }

    /// Add each enabled server that the agent does not already have. Per-server
    /// failures are logged and do not stop the batch.
    async fn install(&self, servers: &[McpServer], cli_path: Option<&str>) {
        let family = self.family();
        let bin = self.binary(cli_path);
        // Called directly, not through the queue, which this job is holding.
        let mut existing: HashSet<String> = self
            .detect(cli_path, false)
            .await
            .into_iter()
            .map(|server| server.name)
            .collect();

        for server in servers.iter().filter(|server| server.enabled) {
            if existing.contains(&server.name) {
                tracing::info!(agent = %family, server = %server.name, "already configured; skipping");
                continue;
            }
            let kind = server.transport.kind();
            if !self.profile.supported_transports().contains(&kind) {
                tracing::warn!(
                    agent = %family,
                    server = %server.name,
                    transport = %kind,
                    "transport not supported by agent; skipping"
                );
                continue;
            }
            let Some(spec) = self.profile.add_command(&bin, server) else {
                tracing::warn!(agent = %family, server = %server.name, "server cannot be expressed for agent; skipping");
                continue;
            };
            let spec = spec.timeout(self.settings.install_timeout);

            match self.run_checked(&spec).await {
                Ok(_) => {
                    tracing::info!(agent = %family, server = %server.name, "added server");
                    existing.insert(server.name.clone());
                }
                Err(err) => {
                    tracing::warn!(agent = %family, server = %server.name, error = %err, "failed to add server");
                }
            }
        }
    }

    /// Try each scope in order, then the config-file fallback. Removing a
    /// server that every scope reports absent succeeds, even when the
    /// fallback file cannot be read.
    async fn remove(&self, name: &str, cli_path: Option<&str>) -> Result<(), AgentError> {
        let family = self.family();
        let bin = self.binary(cli_path);
        let mut last_error = None;

        for scope in self.profile.remove_scopes() {
            let spec = self
                .profile
                .remove_command(&bin, name, scope)
                .timeout(self.settings.metadata_timeout);
            let output = match self.runner.run(&spec).await {
                Ok(output) => output,
                Err(err) => {
                    tracing::debug!(agent = %family, scope, error = %err, "remove command failed");
                    last_error = Some(AgentError::from(err));
                    continue;
                }
            };
            if output.success() {
                tracing::info!(agent = %family, server = name, scope, "removed server");
                return Ok(());
            }
            if self.profile.is_not_found(&output) {
                tracing::debug!(agent = %family, server = name, scope, "not present in scope");
                continue;
            }
            last_error = Some(AgentError::Command {
                program: spec.program.clone(),
                code: output.code,
                stderr: output.combined().trim().to_string(),
            });
        }

        let fallback = self
            .settings
            .home_dir
            .as_deref()
            .and_then(|home| self.profile.fallback_config(home));
        if let Some(file) = fallback {
            match file.remove_entry(name) {
                Ok(true) => {
                    tracing::info!(
                        agent = %family,
                        server = name,
                        path = %file.path.display(),
                        "removed server from config file"
                    );
                    return Ok(());
                }
                Ok(false) => {}
                Err(err) => match last_error {
                    Some(cli_error) => return Err(cli_error),
                    None => {
                        // Every scope already reported the server as absent.
                        tracing::warn!(
                            agent = %family,
                            server = name,
                            path = %file.path.display(),
                            error = %err,
                            "could not edit config file; treating server as removed"
                        );
                        return Ok(());
                    }
                },
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

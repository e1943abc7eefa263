//! The virtual local agent, backed by the application config store.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use super::{AgentAdapter, OperationQueue, OperationResult};
use crate::config::ConfigStore;
use crate::mcp::{McpServer, ServerTransport};
use crate::probe::{ConnectionTestResult, ConnectionTester};
use crate::types::{AgentFamily, TransportKind};

/// Store key holding the local agent's server list.
pub const LOCAL_SERVERS_KEY: &str = "mcp.servers";

const LOCAL_TRANSPORTS: &[TransportKind] = &[
    TransportKind::Stdio,
    TransportKind::Sse,
    TransportKind::Http,
    TransportKind::StreamableHttp,
];

pub struct LocalAgent {
    inner: Arc<LocalInner>,
    queue: OperationQueue,
}

struct LocalInner {
    store: Arc<dyn ConfigStore>,
    key: String,
    tester: Arc<dyn ConnectionTester>,
}

impl LocalAgent {
    pub fn new(store: Arc<dyn ConfigStore>, tester: Arc<dyn ConnectionTester>) -> Self {
        Self::with_key(store, tester, LOCAL_SERVERS_KEY)
    }

    pub fn with_key(
        store: Arc<dyn ConfigStore>,
        tester: Arc<dyn ConnectionTester>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(LocalInner {
                store,
                key: key.into(),
                tester,
            }),
            queue: OperationQueue::new(AgentFamily::Local.id()),
        }
    }
}

impl LocalInner {
    fn load(&self) -> anyhow::Result<Vec<McpServer>> {
        match self.store.get(&self.key)? {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("Stored '{}' is not a server list", self.key)),
        }
    }

    /// Merge by name; incoming records replace stored ones.
    fn merge(&self, incoming: &[McpServer]) -> anyhow::Result<()> {
        let mut stored = self.load()?;
        for server in incoming {
            match stored.iter_mut().find(|s| s.name == server.name) {
                Some(slot) => *slot = server.clone(),
                None => stored.push(server.clone()),
            }
        }
        let value = serde_json::to_value(&stored).context("Failed to serialize servers")?;
        self.store.set(&self.key, value)
    }
}

#[async_trait]
impl AgentAdapter for LocalAgent {
    fn backend(&self) -> AgentFamily {
        AgentFamily::Local
    }

    fn supported_transports(&self) -> &'static [TransportKind] {
        LOCAL_TRANSPORTS
    }

    async fn detect(&self, _cli_path: Option<&str>) -> Vec<McpServer> {
        let inner = self.inner.clone();
        let loaded = self.queue.run(async move { inner.load() }).await;
        match loaded {
            Ok(Ok(servers)) => servers
                .into_iter()
                .filter(|server| LOCAL_TRANSPORTS.contains(&server.transport.kind()))
                .collect(),
            Ok(Err(err)) => {
                tracing::warn!(agent = "local", error = %err, "could not read stored servers");
                Vec::new()
            }
            Err(err) => {
                tracing::error!(agent = "local", error = %err, "detection could not run");
                Vec::new()
            }
        }
    }

    async fn install_with(&self, servers: &[McpServer], _cli_path: Option<&str>) -> OperationResult {
        let inner = self.inner.clone();
        let servers = servers.to_vec();
        match self.queue.run(async move { inner.merge(&servers) }).await {
            Ok(Ok(())) => OperationResult::ok(),
            Ok(Err(err)) => OperationResult::failed(format!("{:#}", err)),
            Err(err) => OperationResult::failed(err.to_string()),
        }
    }

    /// The caller owns the local agent's configuration; nothing is removed
    /// here.
    async fn remove_with(&self, name: &str, _cli_path: Option<&str>) -> OperationResult {
        let name = name.to_string();
        match self
            .queue
            .run(async move {
                tracing::debug!(agent = "local", server = %name, "remove is handled by the caller");
            })
            .await
        {
            Ok(()) => OperationResult::ok(),
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

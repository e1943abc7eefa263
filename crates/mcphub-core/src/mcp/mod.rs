//! MCP (Model Context Protocol) server records and wire framing

pub mod protocol;
pub mod spec;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AgentFamily;

pub use spec::ServerTransport;

/// A tool advertised by an MCP server through `tools/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Last known health of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
    Testing,
}

/// Canonical MCP server record shared by every agent adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    /// Stable identifier; `<agent>_<name>` for discovered servers.
    pub id: String,
    /// Natural key within one agent's server set.
    pub name: String,
    pub transport: ServerTransport,
    #[serde(default)]
    pub tools: Vec<McpTool>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub status: ServerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    /// Verbatim copy of the agent's own representation, for display only.
    #[serde(default)]
    pub original_json: String,
}

fn default_enabled() -> bool {
    true
}

impl McpServer {
    pub fn new(id: impl Into<String>, name: impl Into<String>, transport: ServerTransport) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            transport,
            tools: Vec::new(),
            enabled: true,
            status: ServerStatus::Disconnected,
            last_connected: None,
            created_at: now,
            updated_at: now,
            description: String::new(),
            original_json: String::new(),
        }
    }

    /// Record for a server found in an agent's own configuration.
    pub fn discovered(family: AgentFamily, name: &str, transport: ServerTransport) -> Self {
        Self::new(discovered_id(family, name), name, transport)
    }

    pub fn with_status(mut self, status: ServerStatus) -> Self {
        self.status = status;
        if status == ServerStatus::Connected {
            self.last_connected = Some(self.updated_at);
        }
        self
    }

    pub fn with_original_json(mut self, original: impl Into<String>) -> Self {
        self.original_json = original.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

pub fn discovered_id(family: AgentFamily, name: &str) -> String {
    format!("{}_{}", family.id(), name)
}

/// Servers found for one agent. Agents with nothing configured produce none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub source: AgentFamily,
    pub servers: Vec<McpServer>,
}

impl DetectionResult {
    pub fn from_servers(source: AgentFamily, servers: Vec<McpServer>) -> Option<Self> {
        if servers.is_empty() {
            None
        } else {
            Some(Self { source, servers })
        }
    }
}

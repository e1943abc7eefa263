//! Agent adapters.
//!
//! Every agent family shares the [`AgentAdapter`] contract. CLI-backed agents
//! are one generic [`CliAgent`] driven by a per-family [`CliProfile`] that
//! knows the family's command templates, remove scopes and config file. The
//! virtual [`LocalAgent`] stores its servers in the application store.
//!
//! Each adapter owns an [`OperationQueue`]: operations against one agent run
//! strictly one at a time in submission order.

mod cli_agent;
pub mod claude_code;
pub mod codex;
pub mod gemini_cli;
mod local;
mod queue;
mod registry;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AgentConfigFile;
use crate::mcp::{McpServer, ServerTransport};
use crate::probe::ConnectionTestResult;
use crate::runtime::{CommandOutput, CommandSpec};
use crate::types::{AgentFamily, TransportKind};

pub use cli_agent::{AgentSettings, CliAgent};
pub use claude_code::ClaudeCodeProfile;
pub use codex::CodexProfile;
pub use gemini_cli::GeminiFamilyProfile;
pub use local::{LOCAL_SERVERS_KEY, LocalAgent};
pub use queue::OperationQueue;
pub use registry::AdapterRegistry;

/// Outcome of an install or remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Contract shared by every agent adapter. Implementations never fail
/// outward: errors become empty detections or unsuccessful results.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn backend(&self) -> AgentFamily;

    fn supported_transports(&self) -> &'static [TransportKind];

    fn supports(&self, kind: TransportKind) -> bool {
        self.supported_transports().contains(&kind)
    }

    /// Servers currently configured in the agent. `cli_path` overrides the
    /// binary for this call.
    async fn detect(&self, cli_path: Option<&str>) -> Vec<McpServer>;

    async fn install(&self, servers: &[McpServer]) -> OperationResult {
        self.install_with(servers, None).await
    }

    /// [`install`](Self::install) through the same binary `detect` was given.
    async fn install_with(&self, servers: &[McpServer], cli_path: Option<&str>) -> OperationResult;

    async fn remove(&self, name: &str) -> OperationResult {
        self.remove_with(name, None).await
    }

    async fn remove_with(&self, name: &str, cli_path: Option<&str>) -> OperationResult;

    async fn test_connection(&self, transport: &ServerTransport) -> ConnectionTestResult;
}

/// Family-specific knowledge of an agent CLI.
pub trait CliProfile: Send + Sync {
    fn family(&self) -> AgentFamily;

    fn supported_transports(&self) -> &'static [TransportKind];

    fn list_command(&self, bin: &str) -> CommandSpec {
        CommandSpec::new(bin).args(["mcp", "list"])
    }

    /// `None` when the server cannot be expressed for this agent.
    fn add_command(&self, bin: &str, server: &McpServer) -> Option<CommandSpec>;

    /// Scopes tried by remove, in priority order.
    fn remove_scopes(&self) -> &'static [&'static str];

    fn remove_command(&self, bin: &str, name: &str, scope: &str) -> CommandSpec;

    /// Config file edited when no CLI scope removed the server.
    fn fallback_config(&self, home: &Path) -> Option<AgentConfigFile>;

    fn is_not_found(&self, output: &CommandOutput) -> bool {
        let combined = output.combined().to_lowercase();
        NOT_FOUND_SIGNALS
            .iter()
            .any(|signal| combined.contains(signal))
    }
}

const NOT_FOUND_SIGNALS: &[&str] = &["not found", "does not exist", "no mcp server"];

/// `K=V` pairs in a stable order.
pub(crate) fn env_pairs(server: &McpServer) -> Vec<String> {
    match &server.transport {
        ServerTransport::Stdio { env, .. } => {
            env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
        }
        _ => Vec::new(),
    }
}

/// `K: V` header values in a stable order.
pub(crate) fn header_pairs(server: &McpServer) -> Vec<String> {
    server
        .transport
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl CliProfile for Dummy {
        fn family(&self) -> AgentFamily {
            AgentFamily::GeminiCli
        }

        fn supported_transports(&self) -> &'static [TransportKind] {
            &[TransportKind::Stdio]
        }

        fn add_command(&self, _bin: &str, _server: &McpServer) -> Option<CommandSpec> {
            None
        }

        fn remove_scopes(&self) -> &'static [&'static str] {
            &["user"]
        }

        fn remove_command(&self, bin: &str, name: &str, _scope: &str) -> CommandSpec {
            CommandSpec::new(bin).arg(name)
        }

        fn fallback_config(&self, _home: &Path) -> Option<AgentConfigFile> {
            None
        }
    }

    #[test]
    fn not_found_detection_is_case_insensitive() {
        let output = |stderr: &str| CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        };
        assert!(Dummy.is_not_found(&output("Server \"files\" not found in user config")));
        assert!(Dummy.is_not_found(&output("No MCP server named files")));
        assert!(Dummy.is_not_found(&output("Error: server DOES NOT EXIST")));
        assert!(!Dummy.is_not_found(&output("EACCES: permission denied")));
    }

    #[test]
    fn operation_result_serializes_without_empty_error() {
        let json = serde_json::to_string(&OperationResult::ok()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);
    }
}

//! Claude Code CLI profile.

use std::path::Path;

use super::{CliProfile, env_pairs, header_pairs};
use crate::config::AgentConfigFile;
use crate::mcp::{McpServer, ServerTransport};
use crate::runtime::CommandSpec;
use crate::types::{AgentFamily, TransportKind};

#[derive(Debug, Default, Clone, Copy)]
pub struct ClaudeCodeProfile;

impl ClaudeCodeProfile {
    pub fn new() -> Self {
        Self
    }
}

impl CliProfile for ClaudeCodeProfile {
    fn family(&self) -> AgentFamily {
        AgentFamily::ClaudeCode
    }

    fn supported_transports(&self) -> &'static [TransportKind] {
        &[TransportKind::Stdio, TransportKind::Sse, TransportKind::Http]
    }

    fn add_command(&self, bin: &str, server: &McpServer) -> Option<CommandSpec> {
        let base = CommandSpec::new(bin).args(["mcp", "add", "-s", "user"]);
        match &server.transport {
            ServerTransport::Stdio { command, args, .. } => {
                let mut spec = base;
                for pair in env_pairs(server) {
                    spec = spec.arg("-e").arg(pair);
                }
                Some(
                    spec.arg(&server.name)
                        .arg("--")
                        .arg(command)
                        .args(args.iter().cloned()),
                )
            }
            ServerTransport::Sse { url, .. } | ServerTransport::Http { url, .. } => {
                let mut spec = base
                    .arg("--transport")
                    .arg(server.transport.kind().as_str());
                for header in header_pairs(server) {
                    spec = spec.arg("-H").arg(header);
                }
                Some(spec.arg(&server.name).arg(url))
            }
            ServerTransport::StreamableHttp { .. } => None,
        }
    }

    fn remove_scopes(&self) -> &'static [&'static str] {
        &["user", "local", "project"]
    }

    fn remove_command(&self, bin: &str, name: &str, scope: &str) -> CommandSpec {
        CommandSpec::new(bin)
            .args(["mcp", "remove"])
            .arg(name)
            .args(["-s", scope])
    }

    fn fallback_config(&self, home: &Path) -> Option<AgentConfigFile> {
        Some(AgentConfigFile::json(
            home.join(".claude.json"),
            &["mcpServers"],
        ))
    }
}

//! Gemini CLI profile, shared by its forks Qwen Code and iFlow CLI.
//!
//! The forks keep Gemini's `mcp` subcommand and settings layout and differ
//! only in binary name, settings directory and (for iFlow) status words.

use std::path::Path;

use super::{CliProfile, env_pairs, header_pairs};
use crate::config::AgentConfigFile;
use crate::mcp::{McpServer, ServerTransport};
use crate::runtime::CommandSpec;
use crate::types::{AgentFamily, TransportKind};

#[derive(Debug, Clone, Copy)]
pub struct GeminiFamilyProfile {
    family: AgentFamily,
}

impl GeminiFamilyProfile {
    pub fn gemini() -> Self {
        Self {
            family: AgentFamily::GeminiCli,
        }
    }

    pub fn qwen() -> Self {
        Self {
            family: AgentFamily::Qwen,
        }
    }

    pub fn iflow() -> Self {
        Self {
            family: AgentFamily::Iflow,
        }
    }
}

impl CliProfile for GeminiFamilyProfile {
    fn family(&self) -> AgentFamily {
        self.family
    }

    fn supported_transports(&self) -> &'static [TransportKind] {
        &[TransportKind::Stdio, TransportKind::Sse, TransportKind::Http]
    }

    fn add_command(&self, bin: &str, server: &McpServer) -> Option<CommandSpec> {
        let mut spec = CommandSpec::new(bin).args(["mcp", "add", "-s", "user"]);
        for pair in env_pairs(server) {
            spec = spec.arg("-e").arg(pair);
        }
        match &server.transport {
            ServerTransport::Stdio { command, args, .. } => {
                spec = spec.arg(&server.name).arg(command);
                if !args.is_empty() {
                    spec = spec.arg("--").args(args.iter().cloned());
                }
                Some(spec)
            }
            ServerTransport::Sse { url, .. } | ServerTransport::Http { url, .. } => {
                spec = spec.arg("-t").arg(server.transport.kind().as_str());
                for header in header_pairs(server) {
                    spec = spec.arg("-H").arg(header);
                }
                Some(spec.arg(&server.name).arg(url))
            }
            ServerTransport::StreamableHttp { .. } => None,
        }
    }

    fn remove_scopes(&self) -> &'static [&'static str] {
        &["user", "project"]
    }

    fn remove_command(&self, bin: &str, name: &str, scope: &str) -> CommandSpec {
        CommandSpec::new(bin)
            .args(["mcp", "remove", "-s", scope])
            .arg(name)
    }

    fn fallback_config(&self, home: &Path) -> Option<AgentConfigFile> {
        let dir = format!(".{}", self.family.id());
        Some(AgentConfigFile::json(
            home.join(dir).join("settings.json"),
            &["mcpServers"],
        ))
    }
}

//! Codex CLI profile.

use std::path::Path;

use super::{CliProfile, env_pairs};
use crate::config::AgentConfigFile;
use crate::mcp::{McpServer, ServerTransport};
use crate::runtime::CommandSpec;
use crate::types::{AgentFamily, TransportKind};

#[derive(Debug, Default, Clone, Copy)]
pub struct CodexProfile;

impl CodexProfile {
    pub fn new() -> Self {
        Self
    }
}

impl CliProfile for CodexProfile {
    fn family(&self) -> AgentFamily {
        AgentFamily::Codex
    }

    fn supported_transports(&self) -> &'static [TransportKind] {
        &[TransportKind::Stdio, TransportKind::StreamableHttp]
    }

    fn list_command(&self, bin: &str) -> CommandSpec {
        CommandSpec::new(bin).args(["mcp", "list", "--json"])
    }

    fn add_command(&self, bin: &str, server: &McpServer) -> Option<CommandSpec> {
        let spec = CommandSpec::new(bin).args(["mcp", "add"]).arg(&server.name);
        match &server.transport {
            ServerTransport::Stdio { command, args, .. } => {
                let mut spec = spec;
                for pair in env_pairs(server) {
                    spec = spec.arg("--env").arg(pair);
                }
                Some(spec.arg("--").arg(command).args(args.iter().cloned()))
            }
            ServerTransport::StreamableHttp { url, headers } => {
                if !headers.is_empty() {
                    tracing::warn!(
                        server = %server.name,
                        "codex mcp add cannot set HTTP headers; adding without them"
                    );
                }
                Some(spec.arg("--url").arg(url))
            }
            ServerTransport::Sse { .. } | ServerTransport::Http { .. } => None,
        }
    }

    fn remove_scopes(&self) -> &'static [&'static str] {
        &["global"]
    }

    // Codex has a single configuration scope.
    fn remove_command(&self, bin: &str, name: &str, _scope: &str) -> CommandSpec {
        CommandSpec::new(bin).args(["mcp", "remove"]).arg(name)
    }

    fn fallback_config(&self, home: &Path) -> Option<AgentConfigFile> {
        Some(AgentConfigFile::toml(
            home.join(".codex").join("config.toml"),
            &["mcp_servers"],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_requests_json() {
        assert_eq!(
            CodexProfile.list_command("codex").args,
            vec!["mcp", "list", "--json"]
        );
    }

    #[test]
    fn stdio_add_uses_env_flag() {
        let mut server = McpServer::new(
            "1",
            "docs",
            ServerTransport::stdio("uvx", vec!["docs-mcp".into()]),
        );
        if let ServerTransport::Stdio { env, .. } = &mut server.transport {
            env.insert("TOKEN".into(), "x y".into());
        }
        let spec = CodexProfile.add_command("codex", &server).unwrap();
        assert_eq!(
            spec.args,
            vec!["mcp", "add", "docs", "--env", "TOKEN=x y", "--", "uvx", "docs-mcp"]
        );
    }

    #[test]
    fn streamable_add_uses_url_flag() {
        let server = McpServer::new(
            "2",
            "remote",
            ServerTransport::remote(TransportKind::StreamableHttp, "https://r.example/mcp")
                .unwrap(),
        );
        let spec = CodexProfile.add_command("codex", &server).unwrap();
        assert_eq!(
            spec.args,
            vec!["mcp", "add", "remote", "--url", "https://r.example/mcp"]
        );
    }
}

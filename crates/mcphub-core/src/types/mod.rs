//! Shared core types used across adapters, parsers and the coordinator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Agent families whose MCP configuration mcphub manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentFamily {
    /// Claude Code CLI
    #[serde(rename = "claude")]
    ClaudeCode,
    /// Gemini CLI
    #[serde(rename = "gemini")]
    GeminiCli,
    /// Qwen Code (Gemini CLI fork)
    #[serde(rename = "qwen")]
    Qwen,
    /// iFlow CLI (Gemini CLI fork with localized output)
    #[serde(rename = "iflow")]
    Iflow,
    /// OpenAI Codex CLI
    #[serde(rename = "codex")]
    Codex,
    /// Virtual agent backed by the application config store.
    #[serde(rename = "local")]
    Local,
}

impl AgentFamily {
    pub const ALL: [AgentFamily; 6] = [
        AgentFamily::ClaudeCode,
        AgentFamily::GeminiCli,
        AgentFamily::Qwen,
        AgentFamily::Iflow,
        AgentFamily::Codex,
        AgentFamily::Local,
    ];

    pub fn id(self) -> &'static str {
        match self {
            AgentFamily::ClaudeCode => "claude",
            AgentFamily::GeminiCli => "gemini",
            AgentFamily::Qwen => "qwen",
            AgentFamily::Iflow => "iflow",
            AgentFamily::Codex => "codex",
            AgentFamily::Local => "local",
        }
    }

    /// Binary invoked when no explicit CLI path is configured.
    pub fn default_binary(self) -> Option<&'static str> {
        match self {
            AgentFamily::Local => None,
            other => Some(other.id()),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AgentFamily::ClaudeCode => "Claude Code",
            AgentFamily::GeminiCli => "Gemini CLI",
            AgentFamily::Qwen => "Qwen Code",
            AgentFamily::Iflow => "iFlow CLI",
            AgentFamily::Codex => "Codex",
            AgentFamily::Local => "Local",
        }
    }
}

impl fmt::Display for AgentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AgentFamily {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "claude" | "claude-code" => Ok(AgentFamily::ClaudeCode),
            "gemini" | "gemini-cli" => Ok(AgentFamily::GeminiCli),
            "qwen" | "qwen-code" => Ok(AgentFamily::Qwen),
            "iflow" => Ok(AgentFamily::Iflow),
            "codex" => Ok(AgentFamily::Codex),
            "local" => Ok(AgentFamily::Local),
            _ => anyhow::bail!(
                "Unknown agent '{}'. Expected one of: claude, gemini, qwen, iflow, codex, local",
                s
            ),
        }
    }
}

/// Wire transport kinds an MCP server can be reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    Sse,
    Http,
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::Http => "http",
            TransportKind::StreamableHttp => "streamable_http",
        }
    }

    /// Classify a transport label as printed by agent CLIs ("HTTP", "sse",
    /// "streamable-http", ...).
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "stdio" => Some(TransportKind::Stdio),
            "sse" => Some(TransportKind::Sse),
            "http" => Some(TransportKind::Http),
            "streamablehttp" => Some(TransportKind::StreamableHttp),
            _ => None,
        }
    }

    /// Only the HTTP-family transports can carry OAuth credentials.
    pub fn supports_oauth(self) -> bool {
        matches!(self, TransportKind::Http | TransportKind::Sse)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the caller's agent list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub backend: AgentFamily,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<String>,
    /// Forked/embedded variant whose configuration is owned by the local agent.
    #[serde(default)]
    pub embedded: bool,
}

impl AgentDescriptor {
    pub fn new(backend: AgentFamily) -> Self {
        Self {
            backend,
            name: backend.display_name().to_string(),
            cli_path: None,
            embedded: false,
        }
    }

    pub fn with_cli_path(mut self, cli_path: impl Into<String>) -> Self {
        self.cli_path = Some(cli_path.into());
        self
    }

    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }
}

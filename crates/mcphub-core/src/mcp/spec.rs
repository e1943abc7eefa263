//! Transport descriptors for MCP servers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::TransportKind;

/// How an MCP server is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    StreamableHttp {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl ServerTransport {
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        ServerTransport::Stdio {
            command: command.into(),
            args,
            env: BTreeMap::new(),
        }
    }

    /// Build a URL-based transport of the given kind. Returns `None` for stdio.
    pub fn remote(kind: TransportKind, url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        let headers = BTreeMap::new();
        match kind {
            TransportKind::Stdio => None,
            TransportKind::Sse => Some(ServerTransport::Sse { url, headers }),
            TransportKind::Http => Some(ServerTransport::Http { url, headers }),
            TransportKind::StreamableHttp => {
                Some(ServerTransport::StreamableHttp { url, headers })
            }
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            ServerTransport::Stdio { .. } => TransportKind::Stdio,
            ServerTransport::Sse { .. } => TransportKind::Sse,
            ServerTransport::Http { .. } => TransportKind::Http,
            ServerTransport::StreamableHttp { .. } => TransportKind::StreamableHttp,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ServerTransport::Stdio { .. } => None,
            ServerTransport::Sse { url, .. }
            | ServerTransport::Http { url, .. }
            | ServerTransport::StreamableHttp { url, .. } => Some(url),
        }
    }

    pub fn headers(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ServerTransport::Stdio { .. } => None,
            ServerTransport::Sse { headers, .. }
            | ServerTransport::Http { headers, .. }
            | ServerTransport::StreamableHttp { headers, .. } => Some(headers),
        }
    }

    /// Human-readable target: the command line for stdio, the URL otherwise.
    pub fn target(&self) -> String {
        match self {
            ServerTransport::Stdio { command, args, .. } => {
                let mut words = Vec::with_capacity(args.len() + 1);
                words.push(command.as_str());
                words.extend(args.iter().map(String::as_str));
                shell_words::join(words)
            }
            other => other.url().unwrap_or_default().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn transport_is_tagged_on_type() {
        let transport = ServerTransport::stdio("npx", vec!["-y".into(), "server-fs".into()]);
        let value = serde_json::to_value(&transport).unwrap();
        assert_eq!(
            value,
            json!({"type": "stdio", "command": "npx", "args": ["-y", "server-fs"], "env": {}})
        );

        let parsed: ServerTransport =
            serde_json::from_value(json!({"type": "streamable_http", "url": "https://x/mcp"}))
                .unwrap();
        assert_eq!(parsed.kind(), TransportKind::StreamableHttp);
        assert_eq!(parsed.url(), Some("https://x/mcp"));
    }

    #[test]
    fn target_quotes_arguments_with_spaces() {
        let transport = ServerTransport::stdio("node", vec!["/opt/my server/index.js".into()]);
        assert_eq!(transport.target(), "node '/opt/my server/index.js'");
    }
}

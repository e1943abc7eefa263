//! Turns the output of `<agent> mcp list` into [`McpServer`] records.
//!
//! Output is uncontrolled text: it carries ANSI colour, differs per family,
//! and for some families uses localized status words. Lines that do not
//! match are skipped. An output that clearly lists servers but yields none
//! is reported as [`ParseError::Truncated`] so the caller can retry.

mod patterns;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use futures_util::future::join_all;
use regex::Regex;
use serde_json::Value;

use crate::error::ParseError;
use crate::mcp::{McpServer, ServerStatus, ServerTransport};
use crate::probe::ConnectionTester;
use crate::types::{AgentFamily, TransportKind};

pub use patterns::{ListingFormat, STATUS_GLYPHS, listing_format};

static SGR: LazyLock<Regex> = LazyLock::new(|| compile(r"\x1b\[[0-9;]*m"));
static CSI: LazyLock<Regex> = LazyLock::new(|| compile(r"\x1b\[[0-?]*[ -/]*[@-~]"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("ANSI pattern is a valid regex")
}

/// Remove colour codes and other CSI sequences.
pub fn strip_ansi(raw: &str) -> String {
    let without_colour = SGR.replace_all(raw, "");
    CSI.replace_all(&without_colour, "").replace('\r', "")
}

/// Parse one family's listing. Tools are not fetched here; see
/// [`enrich_with_tools`].
pub fn parse_cli_output(family: AgentFamily, raw: &str) -> Result<Vec<McpServer>, ParseError> {
    let Some(format) = listing_format(family) else {
        return Ok(Vec::new());
    };
    let cleaned = strip_ansi(raw);
    match format {
        ListingFormat::Text {
            header,
            empty_sentinels,
            line,
        } => parse_text(family, &cleaned, header, empty_sentinels, line),
        ListingFormat::Json => parse_json(family, &cleaned),
    }
}

fn parse_text(
    family: AgentFamily,
    output: &str,
    header: &str,
    empty_sentinels: &[&str],
    pattern: &Regex,
) -> Result<Vec<McpServer>, ParseError> {
    let trimmed = output.trim();
    if trimmed.is_empty() || empty_sentinels.iter().any(|s| trimmed.contains(s)) {
        return Ok(Vec::new());
    }

    let mut servers: Vec<McpServer> = Vec::new();
    let mut glyph_lines = 0;
    for line in trimmed.lines().map(str::trim) {
        if line.contains(STATUS_GLYPHS) {
            glyph_lines += 1;
        }
        let Some(caps) = pattern.captures(line) else {
            continue;
        };
        let name = caps["name"].trim();
        let target = caps["target"].trim();
        let label = caps.name("transport").map(|m| m.as_str());
        let Some(transport) = build_transport(target, label) else {
            tracing::debug!(agent = %family, line, "unrecognised transport label");
            continue;
        };
        if servers.iter().any(|s| s.name == name) {
            tracing::debug!(agent = %family, server = name, "duplicate server line ignored");
            continue;
        }
        let glyph = caps.name("glyph").map(|m| m.as_str());
        let status = classify_status(glyph, caps["status"].trim());
        tracing::debug!(agent = %family, server = name, ?status, "parsed server line");
        servers.push(
            McpServer::discovered(family, name, transport)
                .with_status(status)
                .with_original_json(line),
        );
    }

    if servers.is_empty() && trimmed.contains(header) && glyph_lines > 0 {
        return Err(ParseError::Truncated {
            family,
            lines: glyph_lines,
        });
    }
    Ok(servers)
}

/// Split the command string on whitespace for stdio; otherwise it is a URL.
fn build_transport(target: &str, label: Option<&str>) -> Option<ServerTransport> {
    let kind = match label {
        Some(label) => TransportKind::from_label(label)?,
        None => TransportKind::Stdio,
    };
    match kind {
        TransportKind::Stdio => {
            let mut words = target.split_whitespace().map(str::to_string);
            let command = words.next()?;
            Some(ServerTransport::stdio(command, words.collect()))
        }
        remote => ServerTransport::remote(remote, target),
    }
}

fn classify_status(glyph: Option<&str>, status: &str) -> ServerStatus {
    let lowered = status.to_lowercase();
    if lowered.starts_with("connected") || status.contains("已连接") {
        ServerStatus::Connected
    } else if lowered.starts_with("disconnected") || status.contains("已断开") {
        ServerStatus::Disconnected
    } else if lowered.contains("fail") || lowered.contains("error") {
        ServerStatus::Error
    } else if glyph == Some("✓") {
        ServerStatus::Connected
    } else {
        ServerStatus::Disconnected
    }
}

fn parse_json(family: AgentFamily, output: &str) -> Result<Vec<McpServer>, ParseError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if !trimmed.starts_with('[') {
        if trimmed.starts_with('{') {
            return Err(ParseError::InvalidJson {
                family,
                message: "expected an array of servers".to_string(),
            });
        }
        // Plain-text notices such as "No MCP servers configured yet."
        tracing::debug!(agent = %family, "listing is not JSON; treating as empty");
        return Ok(Vec::new());
    }

    let entries: Vec<Value> = serde_json::from_str(trimmed).map_err(|err| {
        tracing::debug!(agent = %family, error = %err, "JSON listing did not parse");
        ParseError::Truncated { family, lines: 0 }
    })?;

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let server = json_server(family, entry);
            if server.is_none() {
                tracing::debug!(agent = %family, %entry, "skipping unrecognised server entry");
            }
            server
        })
        .collect())
}

fn json_server(family: AgentFamily, entry: &Value) -> Option<McpServer> {
    let name = entry.get("name")?.as_str()?;
    let transport = entry.get("transport").unwrap_or(entry);
    let kind = match transport.get("type").and_then(Value::as_str) {
        Some(label) => TransportKind::from_label(label)?,
        None if transport.get("command").is_some() => TransportKind::Stdio,
        None if transport.get("url").is_some() => TransportKind::StreamableHttp,
        None => return None,
    };

    let transport = match kind {
        TransportKind::Stdio => ServerTransport::Stdio {
            command: transport.get("command")?.as_str()?.to_string(),
            args: string_list(transport.get("args")),
            env: string_map(transport.get("env")),
        },
        remote => {
            let url = transport.get("url")?.as_str()?;
            let mut built = ServerTransport::remote(remote, url)?;
            let headers = string_map(
                transport
                    .get("http_headers")
                    .or_else(|| transport.get("headers")),
            );
            if let ServerTransport::Sse { headers: h, .. }
            | ServerTransport::Http { headers: h, .. }
            | ServerTransport::StreamableHttp { headers: h, .. } = &mut built
            {
                *h = headers;
            }
            built
        }
    };

    let mut server =
        McpServer::discovered(family, name, transport).with_original_json(entry.to_string());
    // The JSON listing carries no health information.
    server.status = ServerStatus::Disconnected;
    if entry.get("enabled").and_then(Value::as_bool) == Some(false) {
        server = server.disabled();
    }
    Some(server)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Fill `tools` for servers the CLI reports as connected. Failures are
/// logged and leave the tool list empty.
pub async fn enrich_with_tools(servers: &mut [McpServer], tester: &dyn ConnectionTester) {
    let pending = servers
        .iter_mut()
        .filter(|server| server.status == ServerStatus::Connected)
        .map(|server| async move {
            let result = tester.test(&server.transport).await;
            match result.tools {
                Some(tools) if result.success => server.tools = tools,
                _ => tracing::warn!(
                    server = %server.name,
                    error = result.error.as_deref().unwrap_or("unknown error"),
                    "could not fetch tools"
                ),
            }
        });
    join_all(pending).await;
}

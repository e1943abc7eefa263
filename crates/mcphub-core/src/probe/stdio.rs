//! Stdio transport: newline-delimited JSON-RPC over a child's pipes.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::ProbeSettings;
use crate::error::ProbeError;
use crate::mcp::McpTool;
use crate::mcp::protocol::{self, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::runtime::{CommandRunner, CommandSpec};

/// Error substrings npm/npx print when their package cache is corrupted.
pub const CACHE_CORRUPTION_SIGNATURES: &[&str] = &["ENOTEMPTY", "EINTEGRITY"];

const STDERR_GRACE: Duration = Duration::from_secs(1);

pub fn is_cache_corruption(message: &str) -> bool {
    CACHE_CORRUPTION_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

/// Run the handshake; on a cache-corruption failure clean the npm cache and
/// try exactly once more.
pub(super) async fn test_with_cache_recovery(
    command: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
    runner: &dyn CommandRunner,
    settings: &ProbeSettings,
) -> Result<Vec<McpTool>, ProbeError> {
    match handshake(command, args, env, settings).await {
        Err(err) if is_cache_corruption(&err.to_string()) => {
            tracing::warn!(command, error = %err, "package cache looks corrupted; cleaning and retrying");
            clean_npm_cache(runner, settings).await;
            handshake(command, args, env, settings).await
        }
        other => other,
    }
}

async fn clean_npm_cache(runner: &dyn CommandRunner, settings: &ProbeSettings) {
    let spec = CommandSpec::new("npm")
        .args(["cache", "clean", "--force"])
        .timeout(settings.cache_clean_timeout);
    match runner.run(&spec).await {
        Ok(output) if output.success() => tracing::info!("npm cache cleaned"),
        Ok(output) => tracing::warn!(code = ?output.code, "npm cache clean exited unsuccessfully"),
        Err(err) => tracing::warn!(error = %err, "npm cache clean failed"),
    }
}

async fn handshake(
    command: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
    settings: &ProbeSettings,
) -> Result<Vec<McpTool>, ProbeError> {
    let mut child = Command::new(command)
        .args(args)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProbeError::Spawn(format!("{}: {}", command, e)))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| ProbeError::Spawn("stdin not captured".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ProbeError::Spawn("stdout not captured".to_string()))?;
    let stderr_task: Option<JoinHandle<String>> = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        })
    });

    let mut session = StdioSession {
        stdin,
        lines: BufReader::new(stdout).lines(),
    };
    let outcome = tokio::time::timeout(settings.handshake_timeout, session.run())
        .await
        .unwrap_or(Err(ProbeError::Timeout(settings.handshake_timeout)));

    // Tear down regardless of outcome.
    drop(session);
    if let Err(err) = child.kill().await {
        tracing::debug!(error = %err, "failed to kill MCP server process");
    }

    match outcome {
        Ok(tools) => Ok(tools),
        Err(err) => {
            // Grandchildren (npx) can keep the pipe open after the kill.
            let stderr = match stderr_task {
                Some(task) => tokio::time::timeout(STDERR_GRACE, task)
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .unwrap_or_default(),
                None => String::new(),
            };
            let stderr = stderr.trim();
            if stderr.is_empty() {
                Err(err)
            } else {
                Err(ProbeError::WithStderr {
                    source: Box::new(err),
                    stderr: stderr.to_string(),
                })
            }
        }
    }
}

struct StdioSession {
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl StdioSession {
    async fn run(&mut self) -> Result<Vec<McpTool>, ProbeError> {
        self.request(&JsonRpcRequest::initialize(1)).await?;
        self.send(&JsonRpcNotification::initialized()).await?;
        let result = self.request(&JsonRpcRequest::list_tools(2)).await?;
        protocol::parse_tools(&result)
    }

    async fn send<T: serde::Serialize>(&mut self, message: &T) -> Result<(), ProbeError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn request(&mut self, request: &JsonRpcRequest) -> Result<serde_json::Value, ProbeError> {
        self.send(request).await?;
        loop {
            let line = self.lines.next_line().await?.ok_or_else(|| {
                ProbeError::Protocol(format!(
                    "server closed stdout before answering '{}'",
                    request.method
                ))
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Servers may log to stdout; anything that is not our response is skipped.
            let Ok(response) = serde_json::from_str::<JsonRpcResponse>(trimmed) else {
                tracing::trace!(line = trimmed, "skipping non-JSON stdout line");
                continue;
            };
            if !response.answers(request.id) {
                continue;
            }
            return response.into_result();
        }
    }
}

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use serde_json::{Value, json};

use mcphub_core::client::AgentSettings;
use mcphub_core::config::DetectionSettings;
use mcphub_core::error::ProcessError;
use mcphub_core::mcp::{McpServer, McpTool, ServerTransport};
use mcphub_core::probe::{ConnectionTestResult, ConnectionTester};
use mcphub_core::runtime::{CommandOutput, CommandRunner, CommandSpec, PathProbe};

pub fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("missing fixture {}: {}", path.display(), e))
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn exit(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

type Reply = Box<dyn Fn(&CommandSpec) -> Option<CommandOutput> + Send + Sync>;

/// Stand-in for agent CLIs. Replies come from a queue of per-command
/// responses keyed by the first argv words, or from a fallback closure.
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    queued: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    fallback: Reply,
    delay: Option<Duration>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            queued: Mutex::new(Vec::new()),
            fallback: Box::new(|_| Some(ok(""))),
            delay: None,
        }
    }

    /// Every command not otherwise scripted gets `reply`; `None` means the
    /// binary cannot be spawned.
    pub fn with_fallback(
        mut self,
        reply: impl Fn(&CommandSpec) -> Option<CommandOutput> + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Box::new(reply);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue replies for commands whose argv starts with `prefix`
    /// (e.g. `"mcp list"`). Replies are consumed in order; the last one
    /// repeats.
    pub fn on(self, prefix: &str, replies: Vec<CommandOutput>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .push((prefix.to_string(), replies.into()));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|spec| spec.args.join(" ").starts_with(prefix))
            .collect()
    }

    fn reply(&self, spec: &CommandSpec) -> Option<CommandOutput> {
        let argv = spec.args.join(" ");
        let mut queued = self.queued.lock().unwrap();
        for (prefix, replies) in queued.iter_mut() {
            if argv.starts_with(prefix.as_str()) {
                return if replies.len() > 1 {
                    replies.pop_front()
                } else {
                    replies.front().cloned()
                };
            }
        }
        drop(queued);
        (self.fallback)(spec)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        self.calls.lock().unwrap().push(spec.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply(spec).ok_or_else(|| ProcessError::Spawn {
            program: spec.program.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
        })
    }
}

/// Tester that answers every transport with the same tool list.
pub struct StubTester {
    pub tools: Vec<McpTool>,
    pub calls: Mutex<usize>,
}

impl StubTester {
    pub fn with_tools(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            tools: names
                .iter()
                .map(|name| McpTool {
                    name: name.to_string(),
                    description: None,
                })
                .collect(),
            calls: Mutex::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ConnectionTester for StubTester {
    async fn test(&self, _transport: &ServerTransport) -> ConnectionTestResult {
        *self.calls.lock().unwrap() += 1;
        ConnectionTestResult::connected(self.tools.clone())
    }
}

pub struct FixedPathProbe(pub Vec<&'static str>);

#[async_trait]
impl PathProbe for FixedPathProbe {
    async fn exists(&self, binary: &str) -> bool {
        self.0.iter().any(|known| *known == binary)
    }
}

/// Agent settings with fast retries and an isolated home directory.
pub fn agent_settings(home: Option<PathBuf>) -> AgentSettings {
    AgentSettings {
        cli_path: None,
        home_dir: home,
        metadata_timeout: Duration::from_secs(5),
        install_timeout: Duration::from_secs(5),
        detection: DetectionSettings {
            attempts: 3,
            retry_delay_ms: 1,
            fetch_tools: false,
        },
    }
}

pub fn stdio_server(name: &str, command: &str, args: &[&str]) -> McpServer {
    McpServer::new(
        name,
        name,
        ServerTransport::stdio(command, args.iter().map(|a| a.to_string()).collect()),
    )
}

/// Result for an MCP request, or `None` for notifications.
pub fn rpc_reply(request: &Value) -> Option<Value> {
    let id = request.get("id")?.clone();
    let result = match request.get("method").and_then(Value::as_str) {
        Some("initialize") => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "stub", "version": "1.0.0"}
        }),
        Some("tools/list") => json!({
            "tools": [
                {"name": "echo", "description": "Echo the input", "inputSchema": {"type": "object"}},
                {"name": "time", "inputSchema": {"type": "object"}}
            ]
        }),
        _ => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "Method not found"}
            }));
        }
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Accept connections and never answer. Returns the base URL.
pub async fn silent_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

//! Process primitives used to drive agent CLIs.
//!
//! Every external command is described by a [`CommandSpec`]: a program, an
//! argv vector and extra environment. Values are never joined into a shell
//! string; the `shell-words` rendering from [`CommandSpec::display`] is only
//! used in log lines.
//!
//! The [`CommandRunner`] and [`PathProbe`] traits are the seams tests use to
//! replace real processes with scripted fakes.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ProcessError;

/// Default bound for metadata queries such as `mcp list`.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Executable specification for one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout: DEFAULT_METADATA_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-quoted rendering for logs.
    pub fn display(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout and stderr together, for pattern checks that do not care which
    /// stream a CLI chose.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Spawns a command and captures its output, bounded by its `CommandSpec` timeout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        tracing::debug!(command = %spec.display(), "running command");

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(spec.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProcessError::Timeout {
                program: spec.program.clone(),
                after: spec.timeout,
            })?
            .map_err(|source| ProcessError::Io {
                program: spec.program.clone(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Answers whether a binary is reachable on PATH.
#[async_trait]
pub trait PathProbe: Send + Sync {
    async fn exists(&self, binary: &str) -> bool;
}

/// [`PathProbe`] using the `which` crate, with a PowerShell `Get-Command`
/// fallback on Windows for shim-style installs (npm `.ps1` wrappers).
#[derive(Debug, Clone)]
pub struct SystemPathProbe {
    timeout: Duration,
}

impl SystemPathProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemPathProbe {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

#[async_trait]
impl PathProbe for SystemPathProbe {
    async fn exists(&self, binary: &str) -> bool {
        if which::which(binary).is_ok() {
            return true;
        }
        if cfg!(windows) {
            let spec = CommandSpec::new("powershell")
                .args(["-NoProfile", "-Command"])
                .arg(format!("Get-Command {}", binary))
                .timeout(self.timeout);
            return match SystemRunner.run(&spec).await {
                Ok(output) => output.success() && !output.stdout.trim().is_empty(),
                Err(err) => {
                    tracing::debug!(binary, error = %err, "Get-Command probe failed");
                    false
                }
            };
        }
        false
    }
}

//! Error types for mcphub-core.
//!
//! These stay inside the crate's components; the public coordinator and
//! adapter operations convert them into result records.

use std::time::Duration;

use thiserror::Error;

use crate::types::AgentFamily;

/// Failures of a single transport test (handshake, tool listing).
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to spawn MCP server process: {0}")]
    Spawn(String),

    #[error("Failed to communicate with MCP server: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("Timed out after {0:?} waiting for MCP server")]
    Timeout(Duration),

    #[error("MCP server returned error: code={code}, message={message}")]
    Server { code: i64, message: String },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Authentication required (401)")]
    AuthRequired { www_authenticate: String },

    #[error("{source}; stderr: {stderr}")]
    WithStderr {
        #[source]
        source: Box<ProbeError>,
        stderr: String,
    },
}

/// Failures of the subprocess primitive.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// CLI output that could not be turned into server records.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(
        "{family} output lists servers but none could be parsed ({lines} status lines); output looks truncated"
    )]
    Truncated { family: AgentFamily, lines: usize },

    #[error("{family} output is not valid JSON: {message}")]
    InvalidJson {
        family: AgentFamily,
        message: String,
    },
}

impl ParseError {
    /// Whether another attempt at the CLI may produce a complete listing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ParseError::Truncated { .. })
    }
}

/// Internal adapter failures; converted to `OperationResult` at the boundary.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("'{program}' exited with {code:?}: {stderr}")]
    Command {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The per-adapter operation queue could not run a job.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("operation queue for {0} is closed")]
    Closed(String),

    #[error("queued operation for {0} was dropped before completing")]
    Dropped(String),
}

//! mcphub Core Library
//!
//! Detects, installs, removes and tests MCP server configurations across
//! AI coding-agent CLIs (Claude Code, Gemini CLI and its forks, Codex) plus
//! a virtual local agent backed by the application config store.

pub mod client;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod mcp;
pub mod oauth;
pub mod parse;
pub mod probe;
pub mod runtime;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Context
    pub use crate::context::AppContext;
    pub use crate::coordinator::{AgentOutcome, Coordinator, SyncResult};

    // Configuration
    pub use crate::config::{ConfigStore, FileConfigStore, MemoryConfigStore, Settings};

    // MCP
    pub use crate::mcp::{DetectionResult, McpServer, McpTool, ServerStatus, ServerTransport};
    pub use crate::types::{AgentDescriptor, AgentFamily, TransportKind};

    // Adapters
    pub use crate::client::{AdapterRegistry, AgentAdapter, OperationResult};

    // Transport testing
    pub use crate::probe::{ConnectionTestResult, ConnectionTester, TransportProbe};

    // OAuth
    pub use crate::oauth::{OAuthService, OAuthStatus, TokenStore};
}

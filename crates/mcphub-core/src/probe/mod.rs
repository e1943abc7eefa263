//! Transport test engine.
//!
//! Performs the `initialize` + `tools/list` handshake over one of the four
//! transport kinds and reports either the tool list or a structured failure.
//! An authentication requirement is reported separately from generic
//! failures so callers can offer a login.

mod http;
mod sse;
mod stdio;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::WWW_AUTHENTICATE;
use serde::{Deserialize, Serialize};

use crate::error::ProbeError;
use crate::mcp::{McpServer, McpTool, ServerStatus, ServerTransport};
use crate::runtime::CommandRunner;

pub use stdio::{CACHE_CORRUPTION_SIGNATURES, is_cache_corruption};

/// Authentication scheme hinted by a `WWW-Authenticate` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Oauth,
    Basic,
}

impl AuthMethod {
    pub fn from_challenge(header: &str) -> Self {
        if header.to_ascii_lowercase().contains("bearer") {
            AuthMethod::Oauth
        } else {
            AuthMethod::Basic
        }
    }
}

/// Outcome of one connection test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<McpTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub needs_auth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<AuthMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub www_authenticate: Option<String>,
}

impl ConnectionTestResult {
    pub fn connected(tools: Vec<McpTool>) -> Self {
        Self {
            success: true,
            tools: Some(tools),
            ..Default::default()
        }
    }

    /// Connection proven live but the tool list could not be fetched.
    pub fn tools_unavailable(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            tools: Some(Vec::new()),
            error: Some(detail.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn auth_required(www_authenticate: impl Into<String>) -> Self {
        let header = www_authenticate.into();
        Self {
            success: false,
            error: Some("Authentication required".to_string()),
            needs_auth: true,
            auth_method: Some(AuthMethod::from_challenge(&header)),
            www_authenticate: Some(header),
            ..Default::default()
        }
    }

    /// Server status implied by this outcome.
    pub fn status(&self) -> ServerStatus {
        if self.success {
            ServerStatus::Connected
        } else {
            ServerStatus::Error
        }
    }
}

impl McpServer {
    /// Fold a test outcome into the record: tools on success, status always.
    pub fn record_test(&mut self, result: &ConnectionTestResult) {
        if let Some(tools) = &result.tools {
            self.tools = tools.clone();
        }
        self.updated_at = chrono::Utc::now();
        self.status = result.status();
        if self.status == ServerStatus::Connected {
            self.last_connected = Some(self.updated_at);
        }
    }
}

/// Tests whether a transport is reachable.
#[async_trait]
pub trait ConnectionTester: Send + Sync {
    async fn test(&self, transport: &ServerTransport) -> ConnectionTestResult;
}

/// Timeouts for the handshake and the cache-clean recovery step.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    pub handshake_timeout: Duration,
    pub cache_clean_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            cache_clean_timeout: Duration::from_secs(10),
        }
    }
}

/// The real [`ConnectionTester`]: one shared instance per process.
pub struct TransportProbe {
    http: reqwest::Client,
    runner: Arc<dyn CommandRunner>,
    settings: ProbeSettings,
}

impl TransportProbe {
    pub fn new(http: reqwest::Client, runner: Arc<dyn CommandRunner>, settings: ProbeSettings) -> Self {
        Self {
            http,
            runner,
            settings,
        }
    }

    async fn test_stdio(
        &self,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> ConnectionTestResult {
        match stdio::test_with_cache_recovery(
            command,
            args,
            env,
            self.runner.as_ref(),
            &self.settings,
        )
        .await
        {
            Ok(tools) => ConnectionTestResult::connected(tools),
            Err(err) => ConnectionTestResult::failed(err.to_string()),
        }
    }

    async fn test_plain_http(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> ConnectionTestResult {
        let outcome = tokio::time::timeout(
            self.settings.handshake_timeout,
            http::test_plain(&self.http, url, headers),
        )
        .await
        .unwrap_or(Err(ProbeError::Timeout(self.settings.handshake_timeout)));

        match outcome {
            Ok(result) => result,
            Err(ProbeError::AuthRequired { www_authenticate }) => {
                ConnectionTestResult::auth_required(www_authenticate)
            }
            Err(err) => ConnectionTestResult::failed(err.to_string()),
        }
    }

    async fn test_streaming(
        &self,
        transport: &ServerTransport,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> ConnectionTestResult {
        let limit = self.settings.handshake_timeout;
        if let Some(challenge) = auth_precheck(&self.http, url, headers, limit).await {
            return ConnectionTestResult::auth_required(challenge);
        }

        let outcome = match transport {
            ServerTransport::Sse { .. } => {
                tokio::time::timeout(limit, sse::test_session(&self.http, url, headers))
                    .await
                    .unwrap_or(Err(ProbeError::Timeout(limit)))
            }
            _ => http::test_streamable(&self.http, url, headers, limit).await,
        };

        match outcome {
            Ok(tools) => ConnectionTestResult::connected(tools),
            Err(err) => reclassify(err),
        }
    }
}

#[async_trait]
impl ConnectionTester for TransportProbe {
    async fn test(&self, transport: &ServerTransport) -> ConnectionTestResult {
        let result = match transport {
            ServerTransport::Stdio { command, args, env } => {
                self.test_stdio(command, args, env).await
            }
            ServerTransport::Http { url, headers } => self.test_plain_http(url, headers).await,
            ServerTransport::Sse { url, headers }
            | ServerTransport::StreamableHttp { url, headers } => {
                self.test_streaming(transport, url, headers).await
            }
        };
        tracing::debug!(
            transport = %transport.kind(),
            target = %transport.target(),
            success = result.success,
            needs_auth = result.needs_auth,
            "connection test finished"
        );
        result
    }
}

/// One unauthenticated GET before opening a streaming session. Returns the
/// `WWW-Authenticate` challenge when the server demands credentials.
async fn auth_precheck(
    http: &reqwest::Client,
    url: &str,
    headers: &BTreeMap<String, String>,
    limit: Duration,
) -> Option<String> {
    let mut request = http.get(url);
    for (key, value) in headers {
        request = request.header(key, value);
    }
    let response = match tokio::time::timeout(limit, request.send()).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            tracing::debug!(url, error = %err, "auth pre-check request failed");
            return None;
        }
        Err(_) => {
            tracing::debug!(url, ?limit, "auth pre-check timed out");
            return None;
        }
    };
    challenge_of(&response)
}

/// The `WWW-Authenticate` value of a `401` response, if both are present.
pub(crate) fn challenge_of(response: &reqwest::Response) -> Option<String> {
    if response.status() != StatusCode::UNAUTHORIZED {
        return None;
    }
    response
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Map a streaming-session failure to a result, promoting anything that
/// looks like an authorization failure to `needs_auth`.
fn reclassify(err: ProbeError) -> ConnectionTestResult {
    if let ProbeError::AuthRequired { www_authenticate } = err {
        return ConnectionTestResult::auth_required(www_authenticate);
    }
    let message = err.to_string();
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("401") || lowered.contains("unauthorized") {
        return ConnectionTestResult {
            success: false,
            error: Some(message),
            needs_auth: true,
            ..Default::default()
        };
    }
    ConnectionTestResult::failed(message)
}

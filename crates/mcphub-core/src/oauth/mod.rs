//! OAuth token lifecycle for HTTP and SSE servers.
//!
//! Token persistence and the actual authorization flows are collaborators
//! ([`TokenStore`], [`OAuthProvider`]); this service decides whether a server
//! needs a login and routes login/logout requests.

mod store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::client::OperationResult;
use crate::mcp::{McpServer, ServerTransport};
use crate::probe::challenge_of;

pub use store::{EXPIRY_SKEW, FileTokenStore};

/// Whether a server can be used without logging in first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthStatus {
    pub is_authenticated: bool,
    pub needs_login: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OAuthStatus {
    pub fn authenticated() -> Self {
        Self {
            is_authenticated: true,
            needs_login: false,
            error: None,
        }
    }

    /// The status request itself failed; nothing is known about auth.
    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            is_authenticated: false,
            needs_login: false,
            error: Some(error.into()),
        }
    }

    pub fn login_required(error: Option<String>) -> Self {
        Self {
            is_authenticated: false,
            needs_login: true,
            error,
        }
    }
}

/// Credentials persisted for one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Client registration details handed to the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Progress reported by a provider while a login runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OAuthEvent {
    Started {
        server: String,
    },
    /// The user should open `url` to authorize.
    AuthorizationUrl {
        server: String,
        url: String,
    },
    DeviceCode {
        server: String,
        user_code: String,
        verification_uri: String,
    },
    Completed {
        server: String,
    },
    Failed {
        server: String,
        error: String,
    },
}

/// Storage for per-server credentials, keyed by server name.
pub trait TokenStore: Send + Sync {
    fn get_credentials(&self, server_name: &str) -> anyhow::Result<Option<StoredCredentials>>;
    fn save_credentials(&self, server_name: &str, credentials: StoredCredentials)
    -> anyhow::Result<()>;
    fn delete_credentials(&self, server_name: &str) -> anyhow::Result<()>;
    fn list_servers(&self) -> anyhow::Result<Vec<String>>;
    fn is_token_expired(&self, credentials: &StoredCredentials) -> bool;
}

/// Runs discovery and the authorization-code or device flow.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Authenticate and persist the resulting token through the token store.
    async fn authenticate(
        &self,
        server_name: &str,
        config: &OAuthConfig,
        url: &str,
        events: UnboundedSender<OAuthEvent>,
    ) -> anyhow::Result<()>;

    async fn get_valid_token(
        &self,
        server_name: &str,
        config: &OAuthConfig,
    ) -> anyhow::Result<Option<String>>;
}

pub struct OAuthService {
    http: reqwest::Client,
    tokens: Arc<dyn TokenStore>,
    provider: Option<Arc<dyn OAuthProvider>>,
    timeout: Duration,
}

impl OAuthService {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            http,
            tokens,
            provider: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Upper bound for the unauthenticated status request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Probe the server once without credentials; only a `401` carrying a
    /// `WWW-Authenticate` challenge makes the stored token matter.
    pub async fn check_status(&self, server: &McpServer) -> OAuthStatus {
        if !server.transport.kind().supports_oauth() {
            return OAuthStatus::authenticated();
        }
        let Some(url) = server.transport.url() else {
            return OAuthStatus::authenticated();
        };

        let mut request = self.http.get(url);
        if let Some(headers) = server.transport.headers() {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }
        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return OAuthStatus::unreachable(err.to_string()),
            Err(_) => {
                return OAuthStatus::unreachable(format!(
                    "Timed out after {}ms",
                    self.timeout.as_millis()
                ));
            }
        };
        if challenge_of(&response).is_none() {
            return OAuthStatus::authenticated();
        }

        match self.tokens.get_credentials(&server.name) {
            Ok(None) => OAuthStatus::login_required(None),
            Ok(Some(credentials)) if self.tokens.is_token_expired(&credentials) => {
                OAuthStatus::login_required(Some("Token expired".to_string()))
            }
            Ok(Some(_)) => OAuthStatus::authenticated(),
            Err(err) => OAuthStatus {
                is_authenticated: false,
                needs_login: true,
                error: Some(format!("{:#}", err)),
            },
        }
    }

    /// Drive the provider's login flow for an HTTP or SSE server.
    pub async fn login(
        &self,
        server: &McpServer,
        config: Option<OAuthConfig>,
        events: UnboundedSender<OAuthEvent>,
    ) -> OperationResult {
        let url = match &server.transport {
            ServerTransport::Http { url, .. } | ServerTransport::Sse { url, .. } => url,
            other => {
                return OperationResult::failed(format!(
                    "OAuth is only supported for http and sse servers, not {}",
                    other.kind()
                ));
            }
        };
        let Some(provider) = &self.provider else {
            return OperationResult::failed("No OAuth provider is configured");
        };

        let config = config.unwrap_or_default();
        match provider
            .authenticate(&server.name, &config, url, events.clone())
            .await
        {
            Ok(()) => {
                tracing::info!(server = %server.name, "OAuth login completed");
                OperationResult::ok()
            }
            Err(err) => {
                tracing::warn!(server = %server.name, error = %err, "OAuth login failed");
                let _ = events.send(OAuthEvent::Failed {
                    server: server.name.clone(),
                    error: err.to_string(),
                });
                OperationResult::failed(format!("{:#}", err))
            }
        }
    }

    /// Forget stored credentials. Logging out twice is fine.
    pub fn logout(&self, server_name: &str) -> OperationResult {
        match self.tokens.delete_credentials(server_name) {
            Ok(()) => OperationResult::ok(),
            Err(err) => OperationResult::failed(format!("{:#}", err)),
        }
    }

    /// Servers with stored credentials.
    pub fn authenticated_servers(&self) -> Vec<String> {
        self.tokens.list_servers().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not list stored tokens");
            Vec::new()
        })
    }
}

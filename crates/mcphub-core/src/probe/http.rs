//! Plain HTTP and streamable HTTP transports.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use serde::Serialize;
use serde_json::Value;

use super::{ConnectionTestResult, challenge_of};
use crate::error::ProbeError;
use crate::mcp::McpTool;
use crate::mcp::protocol::{self, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

pub(super) const SESSION_HEADER: &str = "mcp-session-id";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const STREAMABLE_ACCEPT: &str = "application/json, text/event-stream";

/// Non-streaming JSON-RPC over POST. A failed `tools/list` after a good
/// `initialize` still counts as a live connection.
pub(super) async fn test_plain(
    http: &reqwest::Client,
    url: &str,
    headers: &BTreeMap<String, String>,
) -> Result<ConnectionTestResult, ProbeError> {
    let client = PostClient {
        http,
        url,
        headers,
        accept: "application/json",
        session_id: None,
    };

    client.call(&JsonRpcRequest::initialize(1)).await?;
    if let Err(err) = client.notify(&JsonRpcNotification::initialized()).await {
        tracing::debug!(url, error = %err, "initialized notification rejected");
    }

    let tools = async {
        let result = client.call(&JsonRpcRequest::list_tools(2)).await?;
        protocol::parse_tools(&result)
    };
    match tools.await {
        Ok(tools) => Ok(ConnectionTestResult::connected(tools)),
        Err(err) => {
            tracing::warn!(url, error = %err, "initialize succeeded but tools/list failed");
            Ok(ConnectionTestResult::tools_unavailable(format!(
                "Failed to list tools: {}",
                err
            )))
        }
    }
}

/// Streamable HTTP: the session id returned by `initialize` is replayed on
/// every later request. `limit` bounds the handshake only; an opened session
/// is always closed with DELETE afterwards, even on timeout.
pub(super) async fn test_streamable(
    http: &reqwest::Client,
    url: &str,
    headers: &BTreeMap<String, String>,
    limit: Duration,
) -> Result<Vec<McpTool>, ProbeError> {
    let mut client = PostClient {
        http,
        url,
        headers,
        accept: STREAMABLE_ACCEPT,
        session_id: None,
    };

    let handshake = async {
        client.open_session().await?;
        if let Err(err) = client.notify(&JsonRpcNotification::initialized()).await {
            tracing::debug!(url, error = %err, "initialized notification rejected");
        }
        let result = client.call(&JsonRpcRequest::list_tools(2)).await?;
        protocol::parse_tools(&result)
    };
    let outcome = tokio::time::timeout(limit, handshake)
        .await
        .unwrap_or(Err(ProbeError::Timeout(limit)));

    client.close_session(CLOSE_TIMEOUT.min(limit)).await;
    outcome
}

struct PostClient<'a> {
    http: &'a reqwest::Client,
    url: &'a str,
    headers: &'a BTreeMap<String, String>,
    accept: &'static str,
    session_id: Option<String>,
}

impl PostClient<'_> {
    fn post<T: Serialize>(&self, body: &T) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .post(self.url)
            .header(ACCEPT, self.accept)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        for (key, value) in self.headers {
            request = request.header(key, value);
        }
        if let Some(session_id) = &self.session_id {
            request = request.header(SESSION_HEADER, session_id);
        }
        request
    }

    async fn open_session(&mut self) -> Result<(), ProbeError> {
        let request = JsonRpcRequest::initialize(1);
        let response = self.send(&request).await?;
        self.session_id = session_id_of(response.headers());
        decode(response, request.id).await?;
        Ok(())
    }

    async fn call(&self, request: &JsonRpcRequest) -> Result<Value, ProbeError> {
        let response = self.send(request).await?;
        decode(response, request.id).await
    }

    async fn notify(&self, notification: &JsonRpcNotification) -> Result<(), ProbeError> {
        self.send(notification).await.map(|_| ())
    }

    async fn send<T: Serialize>(&self, body: &T) -> Result<reqwest::Response, ProbeError> {
        let response = self.post(body).send().await?;
        if let Some(challenge) = challenge_of(&response) {
            return Err(ProbeError::AuthRequired {
                www_authenticate: challenge,
            });
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProbeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn close_session(&self, limit: Duration) {
        let Some(session_id) = &self.session_id else {
            return;
        };
        let mut request = self.http.delete(self.url).header(SESSION_HEADER, session_id);
        for (key, value) in self.headers {
            request = request.header(key, value);
        }
        match tokio::time::timeout(limit, request.send()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                tracing::debug!(url = self.url, error = %err, "failed to close MCP session");
            }
            Err(_) => tracing::debug!(url = self.url, ?limit, "closing MCP session timed out"),
        }
    }
}

fn session_id_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Decode a JSON or `text/event-stream` body into the result for `id`.
async fn decode(response: reqwest::Response, id: u64) -> Result<Value, ProbeError> {
    let is_event_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"));
    let body = response.text().await?;

    let parsed = if is_event_stream {
        protocol::response_from_event_stream(&body, id).ok_or_else(|| {
            ProbeError::Protocol(format!("no response with id {} in event stream", id))
        })?
    } else {
        serde_json::from_str::<JsonRpcResponse>(&body)?
    };
    parsed.into_result()
}

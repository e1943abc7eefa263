//! Legacy SSE transport: requests are POSTed to the endpoint announced by
//! the stream, responses arrive as `message` events on the stream.

use std::collections::BTreeMap;

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::ProbeError;
use crate::mcp::McpTool;
use crate::mcp::protocol::{self, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

pub(super) async fn test_session(
    http: &reqwest::Client,
    url: &str,
    headers: &BTreeMap<String, String>,
) -> Result<Vec<McpTool>, ProbeError> {
    let base = Url::parse(url).map_err(|e| ProbeError::Protocol(format!("invalid URL: {}", e)))?;
    let mut request = http.get(base.clone());
    for (key, value) in headers {
        request = request.header(key, value);
    }
    let stream = EventSource::new(request)
        .map_err(|e| ProbeError::Protocol(format!("cannot open event stream: {}", e)))?;

    let mut session = SseSession {
        http,
        headers,
        stream,
        endpoint: None,
    };
    let outcome = session.run(&base).await;
    session.stream.close();
    outcome
}

struct SseSession<'a> {
    http: &'a reqwest::Client,
    headers: &'a BTreeMap<String, String>,
    stream: EventSource,
    endpoint: Option<Url>,
}

impl SseSession<'_> {
    async fn run(&mut self, base: &Url) -> Result<Vec<McpTool>, ProbeError> {
        let endpoint = self.wait_for_endpoint(base).await?;
        tracing::debug!(endpoint = %endpoint, "SSE endpoint announced");
        self.endpoint = Some(endpoint);

        self.request(&JsonRpcRequest::initialize(1)).await?;
        self.notify(&JsonRpcNotification::initialized()).await?;
        let result = self.request(&JsonRpcRequest::list_tools(2)).await?;
        protocol::parse_tools(&result)
    }

    async fn wait_for_endpoint(&mut self, base: &Url) -> Result<Url, ProbeError> {
        loop {
            match self.next_event().await? {
                Some((event, data)) if event == "endpoint" => {
                    return base.join(data.trim()).map_err(|e| {
                        ProbeError::Protocol(format!("invalid endpoint '{}': {}", data, e))
                    });
                }
                Some(_) => continue,
                None => {
                    return Err(ProbeError::Protocol(
                        "event stream ended before announcing an endpoint".to_string(),
                    ));
                }
            }
        }
    }

    async fn request(&mut self, request: &JsonRpcRequest) -> Result<Value, ProbeError> {
        post(self.http, self.headers, self.endpoint()?, request).await?;
        loop {
            let Some((event, data)) = self.next_event().await? else {
                return Err(ProbeError::Protocol(format!(
                    "event stream ended before answering '{}'",
                    request.method
                )));
            };
            if event != "message" {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(&data) {
                Ok(response) if response.answers(request.id) => return response.into_result(),
                _ => continue,
            }
        }
    }

    async fn notify(&mut self, notification: &JsonRpcNotification) -> Result<(), ProbeError> {
        post(self.http, self.headers, self.endpoint()?, notification).await
    }

    fn endpoint(&self) -> Result<Url, ProbeError> {
        self.endpoint
            .clone()
            .ok_or_else(|| ProbeError::Protocol("no SSE endpoint".to_string()))
    }

    /// Next `(event, data)` pair; `None` once the stream has ended.
    async fn next_event(&mut self) -> Result<Option<(String, String)>, ProbeError> {
        loop {
            match self.stream.next().await {
                None | Some(Err(EventSourceError::StreamEnded)) => return Ok(None),
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) => {
                    return Ok(Some((message.event, message.data)));
                }
                Some(Err(EventSourceError::InvalidStatusCode(status, response))) => {
                    let challenge = response
                        .headers()
                        .get(WWW_AUTHENTICATE)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string);
                    return Err(match challenge {
                        Some(challenge) if status == StatusCode::UNAUTHORIZED => {
                            ProbeError::AuthRequired {
                                www_authenticate: challenge,
                            }
                        }
                        _ => ProbeError::Status {
                            status: status.as_u16(),
                            body: String::new(),
                        },
                    });
                }
                Some(Err(err)) => return Err(ProbeError::Protocol(err.to_string())),
            }
        }
    }
}

/// POST one message to the announced endpoint. Kept apart from [`SseSession`]
/// so the request future does not borrow the event stream, which is not `Sync`.
async fn post<T: Serialize>(
    http: &reqwest::Client,
    headers: &BTreeMap<String, String>,
    endpoint: Url,
    body: &T,
) -> Result<(), ProbeError> {
    let mut request = http.post(endpoint).json(body);
    for (key, value) in headers {
        request = request.header(key, value);
    }
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProbeError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}

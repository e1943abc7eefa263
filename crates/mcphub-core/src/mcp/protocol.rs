//! JSON-RPC 2.0 framing for the `initialize` / `tools/list` handshake.
//!
//! Reference: <https://spec.modelcontextprotocol.io/>

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::McpTool;
use crate::error::ProbeError;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const CLIENT_NAME: &str = "mcphub";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        }
    }

    pub fn initialize(id: u64) -> Self {
        Self::new(id, METHOD_INITIALIZE, Some(initialize_params()))
    }

    pub fn list_tools(id: u64) -> Self {
        Self::new(id, METHOD_TOOLS_LIST, Some(json!({})))
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
}

impl JsonRpcNotification {
    pub fn initialized() -> Self {
        Self {
            jsonrpc: "2.0",
            method: METHOD_INITIALIZED.to_string(),
            params: json!({}),
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    /// Whether this message answers the request with the given id.
    pub fn answers(&self, id: u64) -> bool {
        match &self.id {
            Some(Value::Number(n)) => n.as_u64() == Some(id),
            Some(Value::String(s)) => s.parse::<u64>().ok() == Some(id),
            _ => false,
        }
    }

    pub fn into_result(self) -> Result<Value, ProbeError> {
        if let Some(err) = self.error {
            return Err(ProbeError::Server {
                code: err.code,
                message: err.message,
            });
        }
        self.result
            .ok_or_else(|| ProbeError::Protocol("Missing result in response".to_string()))
    }
}

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

#[derive(Debug, Deserialize)]
struct ToolSchema {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

/// Extract the tool list from a `tools/list` result.
pub fn parse_tools(result: &Value) -> Result<Vec<McpTool>, ProbeError> {
    let tools = match result.get("tools") {
        Some(tools) => tools.clone(),
        None => return Ok(Vec::new()),
    };
    let schemas: Vec<ToolSchema> = serde_json::from_value(tools)?;
    Ok(schemas
        .into_iter()
        .map(|t| McpTool {
            name: t.name,
            description: t.description,
        })
        .collect())
}

/// Pull the first JSON-RPC message answering `id` out of an SSE body.
pub fn response_from_event_stream(body: &str, id: u64) -> Option<JsonRpcResponse> {
    body.split("\n\n").find_map(|event| {
        let data: Vec<&str> = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();
        if data.is_empty() {
            return None;
        }
        serde_json::from_str::<JsonRpcResponse>(&data.join("\n"))
            .ok()
            .filter(|response| response.answers(id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_missing_params() {
        let request = JsonRpcRequest::new(1, METHOD_TOOLS_LIST, None);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn initialize_carries_protocol_version_and_identity() {
        let request = JsonRpcRequest::initialize(1);
        let params = request.params.unwrap();
        assert_eq!(params["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(params["clientInfo"]["name"], CLIENT_NAME);
    }

    #[test]
    fn error_response_becomes_server_error() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request"}}"#;
        let response: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert!(response.answers(1));
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, ProbeError::Server { code: -32600, .. }));
    }

    #[test]
    fn tools_are_extracted_with_optional_description() {
        let result = serde_json::json!({
            "tools": [
                {"name": "read_file", "description": "Read a file", "inputSchema": {}},
                {"name": "list_dir"}
            ]
        });
        let tools = parse_tools(&result).unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].description.as_deref(), Some("Read a file"));
        assert_eq!(tools[1].description, None);
    }

    #[test]
    fn event_stream_body_is_searched_for_matching_id() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n\
                    event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"tools\":[]}}\n\n";
        let response = response_from_event_stream(body, 2).unwrap();
        assert!(response.result.is_some());
        assert!(response_from_event_stream(body, 3).is_none());
    }
}

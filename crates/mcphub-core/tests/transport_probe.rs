//! Connection tests against stub MCP servers.

mod support;

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use mcphub_core::mcp::ServerTransport;
use mcphub_core::probe::{AuthMethod, ConnectionTester, ProbeSettings, TransportProbe};
use mcphub_core::types::TransportKind;
use support::{ScriptedRunner, rpc_reply, serve, silent_server};

const SESSION_ID: &str = "session-42";

fn probe(runner: Arc<ScriptedRunner>) -> TransportProbe {
    TransportProbe::new(
        reqwest::Client::new(),
        runner,
        ProbeSettings {
            handshake_timeout: Duration::from_secs(10),
            cache_clean_timeout: Duration::from_secs(1),
        },
    )
}

fn remote(kind: TransportKind, url: String) -> ServerTransport {
    ServerTransport::remote(kind, url).unwrap()
}

fn tool_names(result: &mcphub_core::probe::ConnectionTestResult) -> Vec<String> {
    result
        .tools
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|tool| tool.name.clone())
        .collect()
}

async fn plain_rpc(Json(body): Json<Value>) -> Response {
    match rpc_reply(&body) {
        Some(reply) => Json(reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn rpc_without_tools(Json(body): Json<Value>) -> Response {
    if body["method"] == "tools/list" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "tool registry offline").into_response();
    }
    plain_rpc(Json(body)).await
}

#[tokio::test]
async fn plain_http_lists_tools() {
    let base = serve(Router::new().route("/mcp", post(plain_rpc))).await;
    let result = probe(Arc::new(ScriptedRunner::new()))
        .test(&remote(TransportKind::Http, format!("{base}/mcp")))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(tool_names(&result), vec!["echo", "time"]);
    assert!(!result.needs_auth);
}

#[tokio::test]
async fn plain_http_tools_failure_still_connects() {
    let base = serve(Router::new().route("/mcp", post(rpc_without_tools))).await;
    let result = probe(Arc::new(ScriptedRunner::new()))
        .test(&remote(TransportKind::Http, format!("{base}/mcp")))
        .await;

    assert!(result.success);
    assert_eq!(result.tools, Some(Vec::new()));
    assert!(result.error.unwrap().contains("500"));
}

#[tokio::test]
async fn bearer_challenge_means_oauth() {
    let app = Router::new().route(
        "/mcp",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer realm=\"mcp\"")],
            )
        }),
    );
    let base = serve(app).await;
    let result = probe(Arc::new(ScriptedRunner::new()))
        .test(&remote(TransportKind::Http, format!("{base}/mcp")))
        .await;

    assert!(!result.success);
    assert!(result.needs_auth);
    assert_eq!(result.auth_method, Some(AuthMethod::Oauth));
    assert_eq!(result.www_authenticate.as_deref(), Some("Bearer realm=\"mcp\""));
}

#[tokio::test]
async fn basic_challenge_on_sse_precheck() {
    let app = Router::new().route(
        "/sse",
        get(|| async {
            (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"stub\"")],
            )
        }),
    );
    let base = serve(app).await;
    let result = probe(Arc::new(ScriptedRunner::new()))
        .test(&remote(TransportKind::Sse, format!("{base}/sse")))
        .await;

    assert!(result.needs_auth);
    assert_eq!(result.auth_method, Some(AuthMethod::Basic));
}

#[tokio::test]
async fn unauthorized_without_challenge_still_needs_auth() {
    let app = Router::new().route(
        "/mcp",
        post(|| async { (StatusCode::UNAUTHORIZED, "Unauthorized") }),
    );
    let base = serve(app).await;
    let result = probe(Arc::new(ScriptedRunner::new()))
        .test(&remote(TransportKind::StreamableHttp, format!("{base}/mcp")))
        .await;

    assert!(!result.success);
    assert!(result.needs_auth);
    assert_eq!(result.auth_method, None);
}

#[tokio::test]
async fn unreachable_server_fails() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = probe(Arc::new(ScriptedRunner::new()))
        .test(&remote(TransportKind::Http, format!("http://{addr}/mcp")))
        .await;

    assert!(!result.success);
    assert!(!result.needs_auth);
    assert!(result.error.is_some());
}

fn quick_probe() -> TransportProbe {
    TransportProbe::new(
        reqwest::Client::new(),
        Arc::new(ScriptedRunner::new()),
        ProbeSettings {
            handshake_timeout: Duration::from_millis(300),
            cache_clean_timeout: Duration::from_secs(1),
        },
    )
}

#[tokio::test]
async fn silent_server_is_bounded_on_every_transport() {
    let base = silent_server().await;

    for kind in [TransportKind::Sse, TransportKind::StreamableHttp, TransportKind::Http] {
        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            quick_probe().test(&remote(kind, format!("{base}/mcp"))),
        )
        .await
        .unwrap_or_else(|_| panic!("{kind} test did not finish"));

        assert!(!result.success);
        assert!(!result.needs_auth);
        assert!(result.error.unwrap().contains("Timed out"), "{kind}");
        assert!(started.elapsed() < Duration::from_secs(2), "{kind}");
    }
}

#[derive(Default)]
struct StreamableState {
    closed: Mutex<Option<String>>,
}

async fn streamable_rpc(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let session = headers.get("mcp-session-id").and_then(|v| v.to_str().ok());
    if body["method"] != "initialize" && session != Some(SESSION_ID) {
        return (StatusCode::BAD_REQUEST, "missing session").into_response();
    }
    match rpc_reply(&body) {
        Some(reply) => (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (HeaderName::from_static("mcp-session-id"), SESSION_ID),
            ],
            format!("event: message\ndata: {reply}\n\n"),
        )
            .into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn close_session(State(state): State<Arc<StreamableState>>, headers: HeaderMap) -> StatusCode {
    let session = headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.closed.lock().unwrap() = session;
    StatusCode::OK
}

#[tokio::test]
async fn streamable_http_replays_and_closes_session() {
    let state = Arc::new(StreamableState::default());
    let app = Router::new()
        .route("/mcp", post(streamable_rpc).delete(close_session))
        .with_state(state.clone());
    let base = serve(app).await;

    let result = probe(Arc::new(ScriptedRunner::new()))
        .test(&remote(TransportKind::StreamableHttp, format!("{base}/mcp")))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(tool_names(&result), vec!["echo", "time"]);
    assert_eq!(state.closed.lock().unwrap().as_deref(), Some(SESSION_ID));
}

async fn stalled_tools_rpc(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if body["method"] == "tools/list" {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
    streamable_rpc(headers, Json(body)).await
}

#[tokio::test]
async fn streamable_http_closes_session_after_timeout() {
    let state = Arc::new(StreamableState::default());
    let app = Router::new()
        .route("/mcp", post(stalled_tools_rpc).delete(close_session))
        .with_state(state.clone());
    let base = serve(app).await;

    let result = quick_probe()
        .test(&remote(TransportKind::StreamableHttp, format!("{base}/mcp")))
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("Timed out"));
    assert_eq!(state.closed.lock().unwrap().as_deref(), Some(SESSION_ID));
}

#[derive(Clone, Default)]
struct SseState {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Event>>>>,
}

async fn sse_stream(
    State(state): State<SseState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tx.send(Event::default().event("endpoint").data("/messages?sessionId=1"));
    *state.sender.lock().unwrap() = Some(tx);
    Sse::new(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    }))
}

async fn sse_message(State(state): State<SseState>, Json(body): Json<Value>) -> StatusCode {
    if let Some(reply) = rpc_reply(&body)
        && let Some(sender) = state.sender.lock().unwrap().as_ref()
    {
        let _ = sender.send(Event::default().event("message").data(reply.to_string()));
    }
    StatusCode::ACCEPTED
}

#[tokio::test]
async fn sse_uses_announced_endpoint() {
    let app = Router::new()
        .route("/sse", get(sse_stream))
        .route("/messages", post(sse_message))
        .with_state(SseState::default());
    let base = serve(app).await;

    let result = probe(Arc::new(ScriptedRunner::new()))
        .test(&remote(TransportKind::Sse, format!("{base}/sse")))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(tool_names(&result), vec!["echo", "time"]);
}

#[cfg(unix)]
mod stdio {
    use super::*;

    const STUB_SERVER: &str = r#"
echo "stub server starting"
while IFS= read -r line; do
  case "$line" in
    *'"method":"initialize"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":99,"result":{}}'
      printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"sh","version":"0"}}}'
      ;;
    *'"method":"tools/list"'*)
      printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"echo","description":"Echo"}]}}'
      ;;
  esac
done
"#;

    fn sh(script: &str) -> ServerTransport {
        ServerTransport::stdio("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn stdio_handshake_skips_noise() {
        let result = probe(Arc::new(ScriptedRunner::new())).test(&sh(STUB_SERVER)).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(tool_names(&result), vec!["echo"]);
    }

    #[tokio::test]
    async fn stdio_missing_command_fails() {
        let transport = ServerTransport::stdio("/nonexistent/mcp-server", Vec::new());
        let result = probe(Arc::new(ScriptedRunner::new())).test(&transport).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("spawn"));
    }

    #[tokio::test]
    async fn stdio_cache_corruption_cleans_once_and_retries() {
        let runner = Arc::new(ScriptedRunner::new());
        let result = probe(runner.clone())
            .test(&sh("echo 'npm ERR! code ENOTEMPTY' >&2; exit 1"))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("ENOTEMPTY"));
        let cleans = runner.calls_matching("cache clean --force");
        assert_eq!(cleans.len(), 1);
        assert_eq!(cleans[0].program, "npm");
    }

    #[tokio::test]
    async fn stdio_handshake_times_out() {
        let probe = TransportProbe::new(
            reqwest::Client::new(),
            Arc::new(ScriptedRunner::new()),
            ProbeSettings {
                handshake_timeout: Duration::from_millis(300),
                cache_clean_timeout: Duration::from_secs(1),
            },
        );
        let result = probe.test(&sh("read line; sleep 30")).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Timed out"));
    }
}

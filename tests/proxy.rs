//! End-to-end tests: inbound Anthropic HTTP surface against a scripted
//! Cloud Code upstream.
//!
//! The proxy router is served on an ephemeral port with its dispatcher
//! pointed at a local stub that replays canned upstream responses; the
//! tests then speak plain HTTP like a real client.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;

use antigravity_proxy::accounts::manager::AccountManager;
use antigravity_proxy::accounts::pool::{Account, AccountSource, PoolSettings};
use antigravity_proxy::accounts::storage::AccountsFile;
use antigravity_proxy::auth::discovery::ProjectDiscovery;
use antigravity_proxy::auth::refresh::{RefreshedToken, TokenRefresher};
use antigravity_proxy::config::Config;
use antigravity_proxy::handler::Dispatcher;
use antigravity_proxy::transport::http::HttpClient;
use antigravity_proxy::AppState;

struct StubRefresher;

#[async_trait]
impl TokenRefresher for StubRefresher {
    async fn refresh(
        &self,
        _refresh_token: &str,
    ) -> antigravity_proxy::error::Result<RefreshedToken> {
        Ok(RefreshedToken {
            access_token: "test-token".into(),
            expires_in: Some(3600),
        })
    }
}

struct StubDiscovery;

#[async_trait]
impl ProjectDiscovery for StubDiscovery {
    async fn discover(
        &self,
        _token: &str,
        _hint: Option<&str>,
    ) -> antigravity_proxy::error::Result<String> {
        Ok("test-project".into())
    }
}

/// Upstream stub that replays scripted `(status, body)` responses and
/// records the request bodies it saw.
#[derive(Clone)]
struct Upstream {
    responses: Arc<Mutex<Vec<(u16, &'static str)>>>,
    seen_bodies: Arc<Mutex<Vec<serde_json::Value>>>,
    hits: Arc<AtomicU32>,
}

async fn upstream_handler(
    State(upstream): State<Upstream>,
    body: String,
) -> axum::response::Response {
    upstream.hits.fetch_add(1, Ordering::SeqCst);
    if let Ok(json) = serde_json::from_str(&body) {
        upstream.seen_bodies.lock().unwrap().push(json);
    }
    let (status, text) = {
        let mut responses = upstream.responses.lock().unwrap();
        if responses.is_empty() {
            (200, SIMPLE_OK)
        } else {
            responses.remove(0)
        }
    };
    let status = axum::http::StatusCode::from_u16(status).unwrap();
    if text == EMPTY_CHUNKED_BODY {
        // Streamed body: hyper omits Content-Length and uses chunked
        // transfer encoding, like a real SSE endpoint with no events.
        let empty = futures::stream::empty::<Result<bytes::Bytes, std::io::Error>>();
        return axum::response::Response::builder()
            .status(status)
            .body(axum::body::Body::from_stream(empty))
            .unwrap();
    }
    (status, text.to_string()).into_response()
}

const SIMPLE_OK: &str = r#"{"response":{"candidates":[{"content":{"parts":[{"text":"Hi!"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":5}}}"#;

/// Marker body: the stub answers with a chunked empty body instead.
const EMPTY_CHUNKED_BODY: &str = "<empty-chunked>";

async fn spawn_upstream(responses: Vec<(u16, &'static str)>) -> (String, Upstream) {
    let upstream = Upstream {
        responses: Arc::new(Mutex::new(responses)),
        seen_bodies: Arc::new(Mutex::new(Vec::new())),
        hits: Arc::new(AtomicU32::new(0)),
    };
    // Cloud Code paths contain literal colons; match everything.
    let app = Router::new()
        .fallback(post(upstream_handler))
        .with_state(upstream.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), upstream)
}

/// Serve the proxy itself, dispatching to the given upstream.
async fn spawn_proxy(upstream_url: &str, account_count: usize) -> String {
    let accounts = (0..account_count)
        .map(|i| {
            Account::new(
                format!("a{i}@example.com"),
                AccountSource::Oauth,
                Some("rt".into()),
            )
        })
        .collect();

    let config = Config::default();
    let manager = Arc::new(AccountManager::new(
        AccountsFile {
            accounts,
            settings: PoolSettings::default(),
            active_index: 0,
        },
        None,
        Arc::new(StubRefresher),
        Arc::new(StubDiscovery),
        &config,
    ));
    let dispatcher = Dispatcher::new(
        manager,
        HttpClient::new().with_base_url(upstream_url),
        config,
    );

    let app = antigravity_proxy::api::build_router().with_state(AppState { dispatcher });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_messages_roundtrip() {
    let (upstream_url, upstream) = spawn_upstream(vec![(200, SIMPLE_OK)]).await;
    let proxy_url = spawn_proxy(&upstream_url, 1).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy_url}/v1/messages"))
        .json(&serde_json::json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 1024,
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();

    assert!(body["id"].as_str().unwrap().starts_with("msg_"));
    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["model"], "claude-sonnet-4-5");
    assert_eq!(body["stop_reason"], "end_turn");
    assert!(body["stop_sequence"].is_null());
    assert_eq!(body["content"][0]["type"], "text");
    assert_eq!(body["content"][0]["text"], "Hi!");
    assert_eq!(body["usage"]["input_tokens"], 10);
    assert_eq!(body["usage"]["output_tokens"], 5);
    assert_eq!(body["usage"]["cache_read_input_tokens"], 0);
    assert_eq!(body["usage"]["cache_creation_input_tokens"], 0);

    // The upstream saw a Cloud Code wrapper with the identity preamble
    // and a derived session id.
    let seen = upstream.seen_bodies.lock().unwrap();
    let wrapper = &seen[0];
    assert_eq!(wrapper["project"], "test-project");
    assert_eq!(wrapper["model"], "claude-sonnet-4-5");
    assert_eq!(wrapper["userAgent"], "antigravity");
    assert!(wrapper["requestId"].as_str().unwrap().starts_with("agent-"));
    let session_id = wrapper["request"]["sessionId"].as_str().unwrap();
    assert_eq!(session_id.len(), 32);
    assert!(wrapper["request"]["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with("You are Antigravity"));
}

#[tokio::test]
async fn test_messages_streaming_sse() {
    let sse_body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"promptTokenCount\":3,\"candidatesTokenCount\":2}}\n";
    let (upstream_url, _) = spawn_upstream(vec![(200, sse_body)]).await;
    let proxy_url = spawn_proxy(&upstream_url, 1).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy_url}/v1/messages"))
        .json(&serde_json::json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 1024,
            "stream": true,
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = response.text().await.unwrap();
    let event_names: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("event: "))
        .collect();
    assert_eq!(
        event_names,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );
    assert!(body.contains(r#""text":"Hel""#));
    assert!(body.contains(r#""stop_reason":"end_turn""#));
}

#[tokio::test]
async fn test_rate_limited_upstream_fails_over_transparently() {
    let (upstream_url, upstream) = spawn_upstream(vec![
        (429, r#"{"error":{"status":"RESOURCE_EXHAUSTED","message":"quotaResetDelay: 60s"}}"#),
        (200, SIMPLE_OK),
    ])
    .await;
    let proxy_url = spawn_proxy(&upstream_url, 2).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy_url}/v1/messages"))
        .json(&serde_json::json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 256,
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .send()
        .await
        .unwrap();

    // The 429 was absorbed by failover; the caller sees success.
    assert_eq!(response.status(), 200);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_chunked_streaming_body_fails_over() {
    // A chunked SSE response with no bytes (and thus no Content-Length
    // header) must fail over to the next account, not reach the caller
    // as an empty event stream.
    let sse_body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"recovered\"}]},\"finishReason\":\"STOP\"}]}\n";
    let (upstream_url, upstream) =
        spawn_upstream(vec![(200, EMPTY_CHUNKED_BODY), (200, sse_body)]).await;
    let proxy_url = spawn_proxy(&upstream_url, 2).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy_url}/v1/messages"))
        .json(&serde_json::json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 256,
            "stream": true,
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    // The caller sees the second account's real content, not the
    // synthesized empty-stream fallback.
    assert!(body.contains(r#""text":"recovered""#));
    let event_names: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("event: "))
        .collect();
    assert!(event_names.contains(&"content_block_delta"));
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_chunked_body_unary_thinking_fails_over() {
    // Unary requests for thinking models collect the SSE path; an empty
    // chunked body there fails over the same way.
    let sse_body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"recovered\"}]},\"finishReason\":\"STOP\"}]}\n";
    let (upstream_url, upstream) =
        spawn_upstream(vec![(200, EMPTY_CHUNKED_BODY), (200, sse_body)]).await;
    let proxy_url = spawn_proxy(&upstream_url, 2).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy_url}/v1/messages"))
        .json(&serde_json::json!({
            "model": "claude-sonnet-4-5-thinking",
            "max_tokens": 2048,
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["content"][0]["text"], "recovered");
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalid_request_error_envelope() {
    let (upstream_url, _) = spawn_upstream(vec![]).await;
    let proxy_url = spawn_proxy(&upstream_url, 1).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy_url}/v1/messages"))
        .json(&serde_json::json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 256,
            "messages": []
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_no_accounts_surfaces_rate_limit_error() {
    let (upstream_url, _) = spawn_upstream(vec![]).await;
    let proxy_url = spawn_proxy(&upstream_url, 0).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{proxy_url}/v1/messages"))
        .json(&serde_json::json!({
            "model": "some-model-without-fallback",
            "max_tokens": 256,
            "messages": [{"role": "user", "content": "Hello"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 429);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "rate_limit_error");
}

#[tokio::test]
async fn test_health_endpoint() {
    let (upstream_url, _) = spawn_upstream(vec![]).await;
    let proxy_url = spawn_proxy(&upstream_url, 2).await;

    let response = reqwest::get(format!("{proxy_url}/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["account_count"], 2);
    assert_eq!(body["accounts"][0]["email"], "a0@example.com");
    assert_eq!(body["accounts"][0]["isInvalid"], false);
}

#[tokio::test]
async fn test_models_endpoint() {
    let (upstream_url, _) = spawn_upstream(vec![]).await;
    let proxy_url = spawn_proxy(&upstream_url, 1).await;

    let response = reqwest::get(format!("{proxy_url}/v1/models")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"claude-sonnet-4-5-thinking"));
    assert!(ids.contains(&"gemini-3-flash"));
}

#[tokio::test]
async fn test_tool_schema_sanitized_on_the_wire() {
    let (upstream_url, upstream) = spawn_upstream(vec![(200, SIMPLE_OK)]).await;
    let proxy_url = spawn_proxy(&upstream_url, 1).await;

    let client = reqwest::Client::new();
    client
        .post(format!("{proxy_url}/v1/messages"))
        .json(&serde_json::json!({
            "model": "claude-sonnet-4-5",
            "max_tokens": 256,
            "messages": [{"role": "user", "content": "Use the tool"}],
            "tools": [{
                "name": "lookup",
                "description": "Looks things up",
                "input_schema": {
                    "$schema": "http://json-schema.org/draft-07/schema#",
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {"q": {"type": "string", "minLength": 1}},
                    "required": ["q", "ghost"]
                }
            }]
        }))
        .send()
        .await
        .unwrap();

    let seen = upstream.seen_bodies.lock().unwrap();
    let declaration = &seen[0]["request"]["tools"][0]["functionDeclarations"][0];
    assert_eq!(declaration["name"], "lookup");
    let params = &declaration["parameters"];
    assert!(params.get("$schema").is_none());
    assert!(params.get("additionalProperties").is_none());
    assert!(params["properties"]["q"].get("minLength").is_none());
    // Phantom required keys are filtered out.
    assert_eq!(params["required"], serde_json::json!(["q"]));
}

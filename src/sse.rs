//! SSE transport for the MCP server.
//!
//! Clients open a long-lived `GET /sse` stream and receive an `endpoint`
//! event naming the URL to POST requests to. Each POST is acknowledged with
//! `202 Accepted` and the JSON-RPC response is delivered as a `message`
//! event on the stream. Requests from all sessions funnel through a single
//! channel into one task that owns the server, so tool calls never overlap.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive},
    response::{IntoResponse, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::{mpsc, RwLock};

use crate::error::{rpc_codes, Result};
use crate::server::{JsonRpcRequest, JsonRpcResponse, McpServer};

/// Shared state for the SSE transport.
pub struct SseState {
    /// Channel for sending requests to the MCP server task.
    request_tx: mpsc::Sender<(JsonRpcRequest, mpsc::Sender<JsonRpcResponse>)>,
    /// Active sessions, keyed by session id.
    sessions: RwLock<HashMap<String, mpsc::Sender<JsonRpcResponse>>>,
}

impl SseState {
    /// Create transport state around a request channel.
    pub fn new(request_tx: mpsc::Sender<(JsonRpcRequest, mpsc::Sender<JsonRpcResponse>)>) -> Self {
        Self {
            request_tx,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

/// Query parameters for the message endpoint.
#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: Option<String>,
}

/// Build the router for the SSE transport.
pub fn router(state: Arc<SseState>) -> Router {
    Router::new()
        .route("/sse", get(handle_sse))
        .route("/messages", post(handle_message))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Unregisters its session when the stream owning it is dropped.
struct SessionGuard {
    state: Arc<SseState>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = Arc::clone(&self.state);
        let session_id = std::mem::take(&mut self.session_id);
        handle.spawn(async move {
            state.sessions.write().await.remove(&session_id);
            tracing::debug!(session_id = %session_id, "SSE session closed");
        });
    }
}

/// Handle `GET /sse`: open a stream and tell the client where to POST.
async fn handle_sse(State(state): State<Arc<SseState>>) -> impl IntoResponse {
    let session_id = uuid::Uuid::new_v4().to_string();

    let (event_tx, event_rx) = mpsc::channel(100);
    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), event_tx);

    tracing::debug!(session_id = %session_id, "SSE session opened");

    let guard = SessionGuard {
        state: Arc::clone(&state),
        session_id: session_id.clone(),
    };

    let stream = async_stream::stream! {
        // Owns the map entry for as long as the client stays connected
        let _guard = guard;

        // First event names the message endpoint for this session
        yield Ok::<_, Infallible>(
            Event::default()
                .event("endpoint")
                .data(format!("/messages?session_id={}", session_id)),
        );

        let mut rx = event_rx;
        while let Some(response) = rx.recv().await {
            let data = serde_json::to_string(&response).unwrap_or_default();
            yield Ok(Event::default().event("message").data(data));
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(30))
            .text("ping"),
    )
}

/// Handle `POST /messages`: forward a request to the server task and push
/// its response onto the session's stream.
async fn handle_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<SessionQuery>,
    body: String,
) -> impl IntoResponse {
    let Some(session_id) = query.session_id else {
        return StatusCode::NOT_FOUND;
    };
    if !state.sessions.read().await.contains_key(&session_id) {
        return StatusCode::NOT_FOUND;
    }

    // A body that does not parse gets the same answer the stdio loop
    // gives: a PARSE_ERROR object, delivered like any other response
    let response = match serde_json::from_str::<JsonRpcRequest>(&body) {
        Ok(request) => {
            let (response_tx, mut response_rx) = mpsc::channel(1);
            if state.request_tx.send((request, response_tx)).await.is_err() {
                return StatusCode::INTERNAL_SERVER_ERROR;
            }
            // Notifications close the channel without sending anything
            response_rx.recv().await
        }
        Err(e) => Some(JsonRpcResponse::error(
            None,
            rpc_codes::PARSE_ERROR,
            format!("Parse error: {}", e),
        )),
    };

    if let Some(response) = response {
        deliver(&state, &session_id, response).await;
    }

    StatusCode::ACCEPTED
}

/// Push a response onto a session's stream. The sender is cloned out of the
/// map so no lock is held while the send waits on a slow consumer; a session
/// whose stream is gone is pruned.
async fn deliver(state: &SseState, session_id: &str, response: JsonRpcResponse) {
    let event_tx = state.sessions.read().await.get(session_id).cloned();
    let delivered = match event_tx {
        Some(tx) => tx.send(response).await.is_ok(),
        None => false,
    };
    if !delivered {
        state.sessions.write().await.remove(session_id);
        tracing::debug!(session_id = %session_id, "dropping response for closed session");
    }
}

/// Handle health check requests.
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "exam-mcp",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Spawn the task that owns the server. Requests from every session funnel
/// through the returned sender and are handled strictly in order.
fn spawn_server(
    server: McpServer,
) -> mpsc::Sender<(JsonRpcRequest, mpsc::Sender<JsonRpcResponse>)> {
    let (request_tx, mut request_rx) =
        mpsc::channel::<(JsonRpcRequest, mpsc::Sender<JsonRpcResponse>)>(32);

    tokio::spawn(async move {
        let mut server = server;
        while let Some((request, response_tx)) = request_rx.recv().await {
            if let Some(response) = server.handle_request(request).await {
                let _ = response_tx.send(response).await;
            }
        }
    });

    request_tx
}

/// Run the server over SSE on the given port.
pub async fn serve(server: McpServer, port: u16) -> Result<()> {
    let app = router(Arc::new(SseState::new(spawn_server(server))));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "SSE transport listening");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbConfig, ExamStore};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let (tx, _rx) = mpsc::channel(1);
        router(Arc::new(SseState::new(tx)))
    }

    /// Full wiring as `serve` builds it, minus the TCP listener. The store
    /// points at a port nothing listens on; the tests below only send
    /// `ping`, which never touches the database.
    fn served_state() -> Arc<SseState> {
        let store = ExamStore::new(DbConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..DbConfig::default()
        });
        Arc::new(SseState::new(spawn_server(McpServer::new(store))))
    }

    fn sse_request() -> Request<Body> {
        Request::builder().uri("/sse").body(Body::empty()).unwrap()
    }

    async fn post_json(app: &Router, uri: &str, body: String) -> StatusCode {
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    async fn single_session_id(state: &SseState) -> String {
        let sessions = state.sessions.read().await;
        assert_eq!(sessions.len(), 1);
        sessions.keys().next().expect("one live session").clone()
    }

    /// End the session's stream and collect every event it produced.
    async fn collect_events(state: &SseState, session_id: &str, body: Body) -> String {
        state.sessions.write().await.remove(session_id);
        let bytes = axum::body::to_bytes(body, 64 * 1024).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf-8 stream")
    }

    /// Payload of the first `message` event in a collected stream.
    fn message_data(events: &str) -> serde_json::Value {
        let data = events
            .lines()
            .skip_while(|line| *line != "event: message")
            .find_map(|line| line.strip_prefix("data: "))
            .expect("stream carries a message event");
        serde_json::from_str(data).expect("message data is JSON")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sse_endpoint_streams() {
        let response = test_router()
            .oneshot(sse_request())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert_eq!(content_type, "text/event-stream");
    }

    #[tokio::test]
    async fn test_message_without_session_is_rejected() {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "ping"
        });

        let status = post_json(
            &test_router(),
            "/messages?session_id=no-such-session",
            request.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_response_arrives_on_stream() {
        let state = served_state();
        let app = router(Arc::clone(&state));

        let response = app.clone().oneshot(sse_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body();

        let session_id = single_session_id(&state).await;
        let endpoint = format!("/messages?session_id={}", session_id);

        let request = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        let status = post_json(&app, &endpoint, request.to_string()).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let events = collect_events(&state, &session_id, body).await;
        assert!(events.contains("event: endpoint"));
        assert!(events.contains(&endpoint));

        let response = message_data(&events);
        assert_eq!(response["id"], serde_json::json!(1));
        assert_eq!(response["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_malformed_post_reports_parse_error_on_stream() {
        let state = served_state();
        let app = router(Arc::clone(&state));

        let response = app.clone().oneshot(sse_request()).await.unwrap();
        let body = response.into_body();

        let session_id = single_session_id(&state).await;
        let endpoint = format!("/messages?session_id={}", session_id);

        let status = post_json(&app, &endpoint, "this is not json".to_string()).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let events = collect_events(&state, &session_id, body).await;
        let response = message_data(&events);
        assert_eq!(response["error"]["code"], serde_json::json!(-32700));
        assert_eq!(response["id"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_disconnected_session_is_removed() {
        let (tx, _rx) = mpsc::channel(1);
        let state = Arc::new(SseState::new(tx));
        let app = router(Arc::clone(&state));

        let response = app.oneshot(sse_request()).await.unwrap();
        assert_eq!(state.sessions.read().await.len(), 1);

        drop(response);

        // Removal runs on a spawned task; give it a moment to land
        for _ in 0..50 {
            if state.sessions.read().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(state.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_session_does_not_block_new_sessions() {
        let state = served_state();
        let app = router(Arc::clone(&state));

        // A session that never reads its stream
        let stalled = app.clone().oneshot(sse_request()).await.unwrap();
        let endpoint = format!("/messages?session_id={}", single_session_id(&state).await);

        // Fill the session's event buffer to capacity
        for id in 0..100 {
            let request = serde_json::json!({"jsonrpc": "2.0", "id": id, "method": "ping"});
            let status = post_json(&app, &endpoint, request.to_string()).await;
            assert_eq!(status, StatusCode::ACCEPTED);
        }

        // This delivery has no buffer slot left and waits indefinitely
        let blocked = tokio::spawn({
            let app = app.clone();
            let endpoint = endpoint.clone();
            async move {
                let request = serde_json::json!({"jsonrpc": "2.0", "id": 100, "method": "ping"});
                post_json(&app, &endpoint, request.to_string()).await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // A fresh session must still come up
        let fresh = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            app.clone().oneshot(sse_request()),
        )
        .await
        .expect("opening a session must not wait on a stalled one")
        .unwrap();
        assert_eq!(fresh.status(), StatusCode::OK);

        blocked.abort();
        drop(stalled);
    }
}

//! HTTP request handlers for the view server.
//!
//! Every handler reads the latest published [`SessionView`]; none of them can
//! reach the store.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use super::types::{HealthResponse, MessagesResponse};
use crate::projection::TreeEntry;
use crate::session::{SessionHandle, SessionView};

/// Application state shared across all handlers
pub struct AppState {
    /// Reader side of the live session
    pub session: SessionHandle,
    /// Shutdown token for graceful server shutdown
    pub shutdown_token: CancellationToken,
}

impl AppState {
    pub fn new(session: SessionHandle) -> (Arc<Self>, CancellationToken) {
        let shutdown_token = CancellationToken::new();
        let state = Arc::new(Self {
            session,
            shutdown_token: shutdown_token.clone(),
        });
        (state, shutdown_token)
    }
}

/// Health check with store statistics.
///
/// ```json
/// { "status": "ok", "version": "0.1.0", "stats": { "groups": 1, ... }, "updatedAt": "..." }
/// ```
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let view = state.session.current();
    Json(HealthResponse::new(
        state.session.is_closed(),
        view.stats,
        view.updated_at,
    ))
}

/// The latest projected tree.
pub async fn tree(State(state): State<Arc<AppState>>) -> Json<Arc<Vec<TreeEntry>>> {
    Json(state.session.current().tree)
}

/// The message log, oldest first.
pub async fn messages(State(state): State<Arc<AppState>>) -> Json<MessagesResponse> {
    let messages = state.session.current().messages;
    Json(MessagesResponse {
        count: messages.len(),
        data: messages.as_ref().clone(),
    })
}

/// Stream the projected tree, one `data:` event per published view.
///
/// The current tree is sent first. The stream ends when the session is
/// dropped or the server shuts down.
pub async fn tree_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.session.views())
        .map(|view| Ok(view_to_sse(&view)))
        .take_until(state.shutdown_token.clone().cancelled_owned());

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn view_to_sse(view: &SessionView) -> Event {
    let event = Event::default().event("tree");
    match event.json_data(view.tree.as_ref()) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!("[server] failed to encode tree: {}", e);
            Event::default().event("error").data(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{LiveSession, RecordedTransport, SessionConfig};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn bootstrapped_session() -> LiveSession {
        let groups = serde_json::from_value(json!([{
            "id": "G1",
            "nodes": [{ "id": "N1", "groupId": "G1", "online": true,
                        "metrics": [{ "name": "temp", "alias": 7, "value": 21.5 }] }]
        }]))
        .unwrap();
        let mut session = LiveSession::new(
            RecordedTransport::new(groups, vec![]).into_shared(),
            SessionConfig::default(),
        );
        session.bootstrap().await.unwrap();
        session
    }

    fn create_test_app(handle: SessionHandle) -> Router {
        let (state, _shutdown) = AppState::new(handle);
        Router::new()
            .route("/health", get(health))
            .route("/api/tree", get(tree))
            .route("/api/messages", get(messages))
            .route("/api/tree/stream", get(tree_stream))
            .with_state(state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_stats() {
        let session = bootstrapped_session().await;
        let (status, body) = get_json(create_test_app(session.handle()), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["stats"]["nodes"], json!(1));
        assert_eq!(body["stats"]["metrics"], json!(1));
    }

    #[tokio::test]
    async fn test_health_after_close() {
        let session = bootstrapped_session().await;
        let handle = session.handle();
        session.close();

        let (_, body) = get_json(create_test_app(handle), "/health").await;
        assert_eq!(body["status"], json!("closed"));
    }

    #[tokio::test]
    async fn test_tree_endpoint() {
        let session = bootstrapped_session().await;
        let (status, body) = get_json(create_test_app(session.handle()), "/api/tree").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["rowId"], json!("G1"));
        assert_eq!(body[0]["children"][0]["children"][0]["metric"]["value"], json!(21.5));
    }

    #[tokio::test]
    async fn test_messages_endpoint() {
        let session = bootstrapped_session().await;
        let (status, body) = get_json(create_test_app(session.handle()), "/api/messages").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], json!(1));
        assert_eq!(body["data"][0]["type"], json!("INITIAL"));
    }

    #[tokio::test]
    async fn test_tree_stream_sends_current_view() {
        let session = bootstrapped_session().await;
        let app = create_test_app(session.handle());
        // dropping the session ends the watch stream after the current view
        drop(session);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tree/stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("event: tree"));
        assert!(text.contains("\"rowId\":\"G1/N1\""));
    }
}

//! HTTP/SSE view server.
//!
//! Re-publishes the views of one live session for a browser dashboard:
//!
//! ```text
//! +---------------------------------------------+
//! |  Axum HTTP Server                           |
//! |  /health           (GET) -> status + stats  |
//! |  /api/tree         (GET) -> projected tree  |
//! |  /api/messages     (GET) -> message log     |
//! |  /api/tree/stream  (GET) -> SSE tree feed   |
//! +---------------------------------------------+
//!          |
//!          v
//!   SessionHandle (watch::Receiver<SessionView>)
//! ```
//!
//! Compiled with the `server` feature.

mod handlers;
pub mod types;

pub use handlers::AppState;
pub use types::{HealthResponse, MessagesResponse};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::session::SessionHandle;

/// Start the view server.
///
/// Returns the bound address (useful with port 0) and a token that shuts
/// the server down gracefully when cancelled.
///
/// ```ignore
/// let (addr, shutdown) = start_server("127.0.0.1", 0, session.handle()).await?;
/// // ... GET http://{addr}/api/tree ...
/// shutdown.cancel();
/// ```
pub async fn start_server(
    bind: &str,
    port: u16,
    session: SessionHandle,
) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let (state, shutdown_token) = AppState::new(session);
    let app = create_router(state);

    let listener = TcpListener::bind((bind, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", bind, port))?;
    let local_addr = listener.local_addr()?;

    tracing::info!("[server] listening on {}", local_addr);

    let stop = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(stop.cancelled_owned())
            .await
        {
            tracing::error!("[server] error: {}", e);
        }
        tracing::info!("[server] stopped");
    });

    Ok((local_addr, shutdown_token))
}

/// Routes of the view server, without a listener.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/tree", get(handlers::tree))
        .route("/api/messages", get(handlers::messages))
        .route("/api/tree/stream", get(handlers::tree_stream))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{LiveSession, RecordedTransport, SessionConfig};

    fn idle_session() -> LiveSession {
        LiveSession::new(
            RecordedTransport::new(vec![], vec![]).into_shared(),
            SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_start_server_on_ephemeral_port() {
        let session = idle_session();
        let (addr, shutdown) = start_server("127.0.0.1", 0, session.handle())
            .await
            .unwrap();

        assert!(addr.port() > 0);
        assert!(!shutdown.is_cancelled());

        shutdown.cancel();
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_start_server_rejects_bad_bind_address() {
        let session = idle_session();
        assert!(start_server("not-an-address.invalid", 0, session.handle())
            .await
            .is_err());
    }

    mod routes {
        use super::*;
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        #[tokio::test]
        async fn test_unknown_route_is_404() {
            let session = idle_session();
            let (state, _) = AppState::new(session.handle());
            let app = create_router(state);

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/api/nothing")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_health_route_is_mounted() {
            let session = idle_session();
            let (state, _) = AppState::new(session.handle());
            let app = create_router(state);

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/health")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), axum::http::StatusCode::OK);
        }
    }
}

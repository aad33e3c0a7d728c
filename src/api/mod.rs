//! Parlor HTTP API
//!
//! HTTP and WebSocket surface for Parlor, built with Axum.
//!
//! # Endpoints
//!
//! ## Conversations
//! - `GET /api/v1/conversations` - Caller's conversations
//! - `POST /api/v1/conversations` - Create a conversation
//! - `GET /api/v1/conversations/:id/messages` - Message history
//! - `POST /api/v1/conversations/:id/messages` - Post and broadcast a message
//! - `POST /api/v1/conversations/:id/read/:message_id` - Record a read receipt
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws/:conversation_id?token=...` - Real-time conversation session
//!
//! REST endpoints expect `Authorization: Bearer <token>`.
//!
//! # Example
//!
//! ```rust,ignore
//! use parlor::api::{serve, ApiConfig, AppState};
//! use parlor::auth::JwtVerifier;
//! use parlor::store::SqliteStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("parlor.db")?);
//!     let verifier = Arc::new(JwtVerifier::new(b"secret", 30, store.clone()));
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(store, verifier, config.clone());
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use extract::AuthUser;
pub use state::{ApiConfig, AppState};

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/conversations",
            get(routes::conversations::list_conversations)
                .post(routes::conversations::create_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(routes::conversations::list_messages).post(routes::conversations::send_message),
        )
        .route(
            "/conversations/:id/read/:message_id",
            post(routes::conversations::mark_read),
        );

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config.cors_origins);

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .route("/ws/:conversation_id", get(websocket_handler))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Permissive when no origins are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::permissive().allow_origin(AllowOrigin::list(allowed))
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Parlor listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Parlor shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{issue_token, JwtVerifier};
    use crate::store::{ChatStore, SqliteStore};
    use crate::types::{ConversationId, MessageProjection, UserId};
    use crate::websocket::ConnectionHub;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use chrono::Duration;
    use tower::util::ServiceExt;

    const SECRET: &[u8] = b"api-test-secret";

    struct TestApp {
        router: Router,
        hub: Arc<ConnectionHub>,
        conversation: ConversationId,
        bob: UserId,
        ada_token: String,
        eve_token: String,
    }

    async fn create_test_app() -> TestApp {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let ada = store.create_user("ada", None).await.unwrap();
        let bob = store.create_user("bob", None).await.unwrap();
        store.create_user("eve", None).await.unwrap();
        let conversation = store
            .create_conversation(ada.id, &[bob.id], None)
            .await
            .unwrap();

        let verifier = Arc::new(JwtVerifier::new(SECRET, 0, store.clone()));
        let state = AppState::new(store, verifier, ApiConfig::default());
        let hub = Arc::clone(&state.hub);

        TestApp {
            router: build_router(state),
            hub,
            conversation: conversation.id,
            bob: bob.id,
            ada_token: issue_token(SECRET, "ada", Duration::minutes(5)).unwrap(),
            eve_token: issue_token(SECRET, "eve", Duration::minutes(5)).unwrap(),
        }
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, token: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app().await;

        let response = app.router.oneshot(get("/health/live", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let app = create_test_app().await;

        let response = app.router.oneshot(get("/health/ready", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full_reports_hub_counts() {
        let app = create_test_app().await;
        let (tx, _rx) = app.hub.outbound_channel();
        app.hub.admit(app.conversation, app.bob, tx);

        let response = app.router.oneshot(get("/health", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 1);
        assert_eq!(body["active_conversations"], 1);
    }

    #[tokio::test]
    async fn test_missing_bearer_is_unauthorized() {
        let app = create_test_app().await;

        let response = app
            .router
            .oneshot(get("/api/v1/conversations", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_bearer_is_unauthorized() {
        let app = create_test_app().await;

        let response = app
            .router
            .oneshot(get("/api/v1/conversations", Some("not-a-jwt")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_conversations() {
        let app = create_test_app().await;

        let response = app
            .router
            .oneshot(get("/api/v1/conversations", Some(&app.ada_token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], app.conversation.0);
    }

    #[tokio::test]
    async fn test_create_conversation() {
        let app = create_test_app().await;
        let body = format!(r#"{{"participantIds": [{}], "title": "pairing"}}"#, app.bob);

        let response = app
            .router
            .oneshot(post_json("/api/v1/conversations", &app.ada_token, &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["title"], "pairing");
        assert_eq!(body["isGroup"], false);
    }

    #[tokio::test]
    async fn test_create_conversation_alone_is_rejected() {
        let app = create_test_app().await;

        let response = app
            .router
            .oneshot(post_json(
                "/api/v1/conversations",
                &app.ada_token,
                r#"{"participantIds": [9999]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_post_message_broadcasts_and_is_listed() {
        let app = create_test_app().await;
        let (tx, mut rx) = app.hub.outbound_channel();
        app.hub.admit(app.conversation, app.bob, tx);
        // Drain the admission state frame
        rx.try_recv().unwrap();

        let uri = format!("/api/v1/conversations/{}/messages", app.conversation);
        let response = app
            .router
            .clone()
            .oneshot(post_json(&uri, &app.ada_token, r#"{"content": "  hi bob  "}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let posted: MessageProjection =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(posted.content, "hi bob");

        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "message");
        assert_eq!(frame["data"]["id"], posted.id.0);

        let response = app
            .router
            .oneshot(get(&uri, Some(&app.ada_token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let history = body_json(response).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["content"], "hi bob");
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let app = create_test_app().await;
        let uri = format!("/api/v1/conversations/{}/messages", app.conversation);

        let response = app
            .router
            .oneshot(post_json(&uri, &app.ada_token, r#"{"content": "   "}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_participant_sees_not_found() {
        let app = create_test_app().await;
        let uri = format!("/api/v1/conversations/{}/messages", app.conversation);

        let response = app
            .router
            .oneshot(get(&uri, Some(&app.eve_token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mark_read() {
        let app = create_test_app().await;
        let uri = format!("/api/v1/conversations/{}/messages", app.conversation);
        let response = app
            .router
            .clone()
            .oneshot(post_json(&uri, &app.ada_token, r#"{"content": "read me"}"#))
            .await
            .unwrap();
        let posted: MessageProjection =
            serde_json::from_value(body_json(response).await).unwrap();

        let read_uri = format!(
            "/api/v1/conversations/{}/read/{}",
            app.conversation, posted.id
        );
        for _ in 0..2 {
            let response = app
                .router
                .clone()
                .oneshot(post_json(&read_uri, &app.ada_token, ""))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }

        let missing = format!("/api/v1/conversations/{}/read/424242", app.conversation);
        let response = app
            .router
            .oneshot(post_json(&missing, &app.ada_token, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

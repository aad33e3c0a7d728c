//! # Parlor
//!
//! Real-time conversation hub: participants of a conversation connect over
//! WebSocket and receive each other's messages, typing indicators, presence
//! and read receipts as they happen.
//!
//! ## Features
//!
//! - **Per-conversation registry**: one live connection per user, replaced on reconnect
//! - **Ordered fan-out**: every recipient sees a conversation's events in the same order
//! - **Backpressure**: bounded per-connection queues, slow clients are dropped
//! - **Durable history**: messages and receipts persisted to SQLite
//!
//! ## Modules
//!
//! - [`websocket`]: connection hub, broadcast, session gateway and event router
//! - [`store`]: persistence trait and its SQLite implementation
//! - [`auth`]: bearer token verification
//! - [`api`]: HTTP server with Axum
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parlor::api::{serve, ApiConfig, AppState};
//! use parlor::auth::JwtVerifier;
//! use parlor::store::SqliteStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(SqliteStore::open("parlor.db")?);
//!     let verifier = Arc::new(JwtVerifier::new(b"change-me", 30, store.clone()));
//!
//!     let config = ApiConfig::new("127.0.0.1", 8090);
//!     let state = AppState::new(store, verifier, config.clone());
//!
//!     // Serves /ws/:conversation_id and /api/v1 until Ctrl-C
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod store;
pub mod types;
pub mod websocket;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use auth::{issue_token, AuthError, JwtVerifier, TokenVerifier, UserIdentity};

pub use config::{Config, ConfigError};

pub use store::{ChatStore, SqliteStore, StoreError, StoreResult};

pub use types::{
    ConversationId, ConversationSummary, MessageId, MessageProjection, ReceiptProjection, UserId,
    UserPreview,
};

pub use websocket::{
    websocket_handler, ConnectionHub, EventRouter, GatewayError, HubConfig, InboundEvent,
    OutboundEvent, SessionGateway,
};

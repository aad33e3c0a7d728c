//! Application State
//!
//! Shared state accessible by all API handlers and WebSocket sessions.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::auth::TokenVerifier;
use crate::store::ChatStore;
use crate::websocket::{ConnectionHub, HubConfig, SessionGateway};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Durable chat storage
    pub store: Arc<dyn ChatStore>,
    /// Bearer token verification
    pub verifier: Arc<dyn TokenVerifier>,
    /// Live connection registry for real-time fan-out
    pub hub: Arc<ConnectionHub>,
    /// Admission checks for WebSocket sessions
    pub gateway: SessionGateway,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with a default hub
    pub fn new(
        store: Arc<dyn ChatStore>,
        verifier: Arc<dyn TokenVerifier>,
        config: ApiConfig,
    ) -> Self {
        Self::with_hub_config(store, verifier, config, HubConfig::default())
    }

    /// Create AppState with custom hub configuration
    pub fn with_hub_config(
        store: Arc<dyn ChatStore>,
        verifier: Arc<dyn TokenVerifier>,
        config: ApiConfig,
        hub_config: HubConfig,
    ) -> Self {
        let gateway = SessionGateway::new(Arc::clone(&verifier), Arc::clone(&store));
        Self {
            store,
            verifier,
            hub: Arc::new(ConnectionHub::new(hub_config)),
            gateway,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Allowed CORS origins; empty means permissive
    pub cors_origins: Vec<String>,
    /// Default page size for message history
    pub history_limit: usize,
    /// Hard cap on the history page size
    pub max_history_limit: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            cors_origins: Vec::new(),
            history_limit: 50,
            max_history_limit: 500,
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

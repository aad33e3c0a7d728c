//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};

use crate::types::UserId;

// ============================================
// CONVERSATION DTOs
// ============================================

/// Create conversation request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    /// Other participants; the caller is always added
    pub participant_ids: Vec<UserId>,
    /// Optional display title
    #[serde(default)]
    pub title: Option<String>,
}

// ============================================
// MESSAGE DTOs
// ============================================

/// Send message request
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Query parameters for message history
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Page size, clamped to the configured maximum
    #[serde(default)]
    pub limit: Option<usize>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    /// Store status: "ok" or "error"
    pub storage: String,
    /// Live WebSocket connections
    pub connections: usize,
    /// Conversations with at least one live connection or typer
    pub active_conversations: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Server version
    pub version: String,
}

//! Session admission
//!
//! Decides whether an inbound connection may join a conversation. Bad
//! credentials and missing membership are refused with the same close code
//! so a client cannot probe which conversations exist.

use axum::extract::ws::close_code;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{AuthError, TokenVerifier, UserIdentity};
use crate::store::{ChatStore, StoreError};
use crate::types::{ConversationId, UserId};

/// Reasons a connection is refused before admission
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("User {user} is not a participant of conversation {conversation}")]
    NotParticipant {
        conversation: ConversationId,
        user: UserId,
    },

    #[error("Membership lookup failed: {0}")]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// WebSocket close code sent to the client
    pub fn close_code(&self) -> u16 {
        match self {
            GatewayError::Store(_) | GatewayError::Auth(AuthError::Store(_)) => close_code::ERROR,
            _ => close_code::POLICY,
        }
    }
}

/// Authenticates connections and checks conversation membership
#[derive(Clone)]
pub struct SessionGateway {
    verifier: Arc<dyn TokenVerifier>,
    store: Arc<dyn ChatStore>,
}

impl SessionGateway {
    pub fn new(verifier: Arc<dyn TokenVerifier>, store: Arc<dyn ChatStore>) -> Self {
        Self { verifier, store }
    }

    /// Resolve `token` to a user allowed into `conversation`.
    ///
    /// Membership is only checked once the token is valid.
    pub async fn authorize(
        &self,
        token: Option<&str>,
        conversation: ConversationId,
    ) -> Result<UserIdentity, GatewayError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let user = self.verifier.verify(token).await?;

        if !self.store.is_participant(conversation, user.id).await? {
            return Err(GatewayError::NotParticipant {
                conversation,
                user: user.id,
            });
        }

        Ok(user)
    }
}

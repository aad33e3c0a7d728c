//! Per-connection event dispatch
//!
//! Turns decoded inbound events into store writes and hub broadcasts for one
//! admitted (conversation, user) pair.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

use super::hub::ConnectionHub;
use super::messages::{InboundEvent, OutboundEvent, ReadNotice};
use crate::auth::UserIdentity;
use crate::store::{ChatStore, StoreError};
use crate::types::{ConversationId, MessageId};

/// Errors that end a connection's event loop
#[derive(Debug, Error)]
pub enum RouterError {
    /// The store could not persist an event; nothing was broadcast
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Dispatches inbound events for one connection
pub struct EventRouter {
    hub: Arc<ConnectionHub>,
    store: Arc<dyn ChatStore>,
    conversation: ConversationId,
    user: UserIdentity,
}

impl EventRouter {
    pub fn new(
        hub: Arc<ConnectionHub>,
        store: Arc<dyn ChatStore>,
        conversation: ConversationId,
        user: UserIdentity,
    ) -> Self {
        Self {
            hub,
            store,
            conversation,
            user,
        }
    }

    /// Handle one inbound event.
    ///
    /// An error means the connection should be closed.
    pub async fn dispatch(&self, event: InboundEvent) -> Result<(), RouterError> {
        match event {
            InboundEvent::Message { content } => self.on_message(&content).await,
            InboundEvent::Typing { is_typing } => {
                self.hub
                    .set_typing(self.conversation, self.user.id, is_typing);
                Ok(())
            }
            InboundEvent::Read {
                message_id: Some(message_id),
            } => self.on_read(message_id).await,
            InboundEvent::Read { message_id: None } => {
                tracing::debug!(
                    conversation_id = %self.conversation,
                    user_id = %self.user.id,
                    "Read event without messageId ignored"
                );
                Ok(())
            }
            InboundEvent::Unknown { tag } => {
                tracing::debug!(
                    conversation_id = %self.conversation,
                    user_id = %self.user.id,
                    tag = ?tag,
                    "Unknown event ignored"
                );
                Ok(())
            }
        }
    }

    async fn on_message(&self, content: &str) -> Result<(), RouterError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(());
        }

        let message = self
            .store
            .persist_message(self.conversation, self.user.id, content)
            .await?;

        tracing::debug!(
            conversation_id = %self.conversation,
            user_id = %self.user.id,
            message_id = %message.id,
            "Message persisted"
        );

        self.hub
            .broadcast(self.conversation, &OutboundEvent::Message { data: message });
        Ok(())
    }

    async fn on_read(&self, message_id: MessageId) -> Result<(), RouterError> {
        match self
            .store
            .upsert_receipt(self.conversation, message_id, self.user.id)
            .await
        {
            Ok((_, created)) => {
                tracing::trace!(
                    conversation_id = %self.conversation,
                    user_id = %self.user.id,
                    message_id = %message_id,
                    created,
                    "Receipt recorded"
                );
            }
            Err(StoreError::MessageNotFound { .. }) => {
                tracing::debug!(
                    conversation_id = %self.conversation,
                    user_id = %self.user.id,
                    message_id = %message_id,
                    "Read event for unknown message ignored"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        // The stored read_at is kept on duplicates; the broadcast always
        // carries the time of this read action.
        let notice = ReadNotice {
            message_id,
            user_id: self.user.id,
            read_at: Utc::now(),
        };
        self.hub
            .broadcast(self.conversation, &OutboundEvent::Read { data: notice });
        Ok(())
    }
}

//! Chat persistence
//!
//! The hub never touches SQL directly: everything it needs from durable
//! storage goes through [`ChatStore`]. [`SqliteStore`] is the bundled
//! implementation.

mod error;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::types::{
    ConversationId, ConversationSummary, MessageId, MessageProjection, ReceiptProjection, UserId,
    UserPreview,
};

/// Durable storage for users, conversations, messages and receipts
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Look up a user by login name
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserPreview>>;

    /// Create a user
    async fn create_user(
        &self,
        username: &str,
        avatar_url: Option<&str>,
    ) -> StoreResult<UserPreview>;

    /// Whether `user` is a listed participant of `conversation`
    async fn is_participant(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> StoreResult<bool>;

    /// Append a message authored by `sender`
    async fn persist_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        content: &str,
    ) -> StoreResult<MessageProjection>;

    /// Record that `user` read `message`.
    ///
    /// The first receipt for a pair wins; the boolean is `true` only when this
    /// call created it.
    async fn upsert_receipt(
        &self,
        conversation: ConversationId,
        message: MessageId,
        user: UserId,
    ) -> StoreResult<(ReceiptProjection, bool)>;

    /// Latest `limit` messages, oldest first
    async fn list_messages(
        &self,
        conversation: ConversationId,
        limit: usize,
    ) -> StoreResult<Vec<MessageProjection>>;

    /// Conversations `user` participates in, newest first
    async fn list_conversations(&self, user: UserId) -> StoreResult<Vec<ConversationSummary>>;

    /// Create a conversation owned by `owner`
    async fn create_conversation(
        &self,
        owner: UserId,
        participants: &[UserId],
        title: Option<&str>,
    ) -> StoreResult<ConversationSummary>;

    /// Cheap round-trip used by readiness probes
    async fn health_check(&self) -> StoreResult<()>;
}

//! Persistence error types

use thiserror::Error;

use crate::types::{ConversationId, MessageId};

/// Errors that can occur in the chat store
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite reported an error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O operation failed (creating the database directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The message does not exist in the given conversation
    #[error("Message {message_id} not found in conversation {conversation_id}")]
    MessageNotFound {
        conversation_id: ConversationId,
        message_id: MessageId,
    },

    /// Conversation does not exist
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// Input rejected by the store
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// The connection mutex was poisoned by a panicking writer
    #[error("Lock error: {0}")]
    Lock(String),

    /// The blocking task running the query was cancelled or panicked
    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::MessageNotFound {
            conversation_id: ConversationId(7),
            message_id: MessageId(42),
        };
        assert_eq!(err.to_string(), "Message 42 not found in conversation 7");

        let err = StoreError::Invalid("need two participants".to_string());
        assert_eq!(err.to_string(), "Invalid input: need two participants");
    }
}

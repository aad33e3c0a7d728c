//! Core identifiers and persisted projections
//!
//! Identifiers are thin newtypes over the integer keys used by the store so a
//! `UserId` can never be passed where a `ConversationId` is expected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifier of a conversation
    ConversationId
);
id_type!(
    /// Identifier of a user
    UserId
);
id_type!(
    /// Identifier of a persisted message
    MessageId
);

/// Public view of a user, embedded in message and conversation projections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreview {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A message as it was stored, ready to be sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProjection {
    pub id: MessageId,
    pub sender: UserPreview,
    pub content: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

/// A stored read receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptProjection {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

/// A conversation with its participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: Option<String>,
    pub is_group: bool,
    pub owner_id: Option<UserId>,
    pub participants: Vec<UserPreview>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&vec![UserId(3), UserId(9)]).unwrap();
        assert_eq!(json, "[3,9]");

        let id: ConversationId = serde_json::from_str("7").unwrap();
        assert_eq!(id, ConversationId(7));
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn test_message_projection_uses_camel_case() {
        let msg = MessageProjection {
            id: MessageId(1),
            sender: UserPreview {
                id: UserId(2),
                username: "ada".to_string(),
                avatar_url: None,
            },
            content: "hi".to_string(),
            is_system: false,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["sender"]["avatarUrl"], serde_json::Value::Null);
        assert_eq!(value["isSystem"], false);
        assert!(value.get("createdAt").is_some());
    }
}

//! WebSocket Message Types
//!
//! Inbound frames are decoded into [`InboundEvent`] before dispatch; outbound
//! frames are [`OutboundEvent`]s serialized once per broadcast.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{MessageId, MessageProjection, UserId};

/// Events sent from client to server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Post a message. Content is untrimmed; blank content is dropped later.
    Message { content: String },
    /// Typing indicator toggle
    Typing { is_typing: bool },
    /// Read receipt. `None` when the client omitted the message id.
    Read { message_id: Option<MessageId> },
    /// Any other (or missing) tag; ignored by the router
    Unknown { tag: Option<String> },
}

/// Inbound frame could not be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Binary frames are not supported")]
    Binary,
}

impl InboundEvent {
    /// Decode a text frame.
    ///
    /// Missing or mistyped `isTyping` reads as `false`; a missing `content`
    /// reads as empty. Anything else that is present with the wrong type is
    /// a decode error.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(fields) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let event = match fields.get("event").and_then(Value::as_str) {
            Some("message") => InboundEvent::Message {
                content: string_field(&fields, "content")?,
            },
            Some("typing") => InboundEvent::Typing {
                is_typing: fields
                    .get("isTyping")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            Some("read") => InboundEvent::Read {
                message_id: id_field(&fields, "messageId")?,
            },
            other => InboundEvent::Unknown {
                tag: other.map(str::to_string),
            },
        };

        Ok(event)
    }
}

fn string_field(fields: &Map<String, Value>, field: &'static str) -> Result<String, DecodeError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DecodeError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

fn id_field(
    fields: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<MessageId>, DecodeError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(|id| Some(MessageId(id)))
            .ok_or(DecodeError::InvalidField {
                field,
                expected: "an integer",
            }),
    }
}

/// Events sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Presence snapshot for the conversation
    State {
        typing: Vec<UserId>,
        online: Vec<UserId>,
    },
    /// A newly persisted message
    Message { data: MessageProjection },
    /// A read receipt action
    Read { data: ReadNotice },
}

/// Payload of a `read` event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadNotice {
    pub message_id: MessageId,
    pub user_id: UserId,
    /// Time of this read action, not necessarily the stored receipt time
    pub read_at: DateTime<Utc>,
}

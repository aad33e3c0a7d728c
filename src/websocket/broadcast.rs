//! Event fan-out to the connections of one conversation.
//!
//! An event is serialized once and the same frame is queued for every
//! recipient. Queuing never waits: a recipient whose queue is full or closed
//! is evicted on the spot. Eviction releases its session and the remaining
//! recipients get a fresh `state` right away.

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

use super::hub::ConnectionHub;
use super::messages::OutboundEvent;
use super::presence::{Frame, Room};
use crate::types::ConversationId;

impl ConnectionHub {
    /// Send `event` to every connection in `conversation`.
    ///
    /// Returns the number of connections the frame was queued for. A
    /// conversation with no connections is a silent no-op.
    pub fn broadcast(&self, conversation: ConversationId, event: &OutboundEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        self.fan_out(conversation, move |_| Some(frame))
    }

    /// Send the current typing and online lists to `conversation`
    pub fn broadcast_state(&self, conversation: ConversationId) -> usize {
        self.fan_out(conversation, |room| {
            encode(&OutboundEvent::State {
                typing: room.typing(),
                online: room.online(),
            })
        })
    }

    /// Queue a frame for every connection of `conversation`.
    ///
    /// The frame is built and queued under the conversation's exclusive
    /// lock, so all recipients observe broadcasts in the same order and a
    /// state snapshot always matches the room it was taken from.
    fn fan_out(
        &self,
        conversation: ConversationId,
        build: impl FnOnce(&Room) -> Option<Frame>,
    ) -> usize {
        let (delivered, evicted) = {
            let Some(mut room) = self.rooms.get_mut(&conversation) else {
                return 0;
            };
            if room.connections.is_empty() {
                return 0;
            }
            let Some(frame) = build(&room) else {
                return 0;
            };

            let mut delivered = 0;
            let mut failed = Vec::new();
            for (user, handle) in &room.connections {
                match handle.sender.try_send(Arc::clone(&frame)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            conversation_id = %conversation,
                            user_id = %user,
                            connection_id = %handle.id,
                            "Outbound queue full, dropping slow connection"
                        );
                        failed.push(*user);
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(
                            conversation_id = %conversation,
                            user_id = %user,
                            connection_id = %handle.id,
                            "Outbound queue closed, dropping connection"
                        );
                        failed.push(*user);
                    }
                }
            }

            for user in &failed {
                room.evict(*user);
            }

            (delivered, failed.len())
        };

        if evicted > 0 {
            self.drop_if_empty(conversation);
            // Room lock is no longer held here.
            self.broadcast_state(conversation);
        }

        tracing::trace!(
            conversation_id = %conversation,
            recipients = delivered,
            evicted,
            "Broadcast event"
        );

        delivered
    }
}

fn encode(event: &OutboundEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Frame::from(json)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize outbound event");
            None
        }
    }
}

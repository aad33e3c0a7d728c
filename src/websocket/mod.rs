//! WebSocket Conversation Hub
//!
//! Fans messages, typing indicators, presence and read receipts out to every
//! participant currently connected to a conversation.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: per-conversation registry of live connections and typing users
//! - **Broadcast**: serialize-once fan-out over bounded per-connection queues
//! - **SessionGateway**: token + membership check before admission
//! - **EventRouter**: turns inbound events into store writes and broadcasts
//! - **Handler**: WebSocket upgrade, writer task, reader loop, cleanup
//!
//! ## Protocol
//!
//! Clients connect to `/ws/{conversation_id}?token=...` and send one JSON
//! object per text frame:
//! - `{"event": "message", "content": "..."}`
//! - `{"event": "typing", "isTyping": true}`
//! - `{"event": "read", "messageId": 42}`
//!
//! The server sends `state`, `message` and `read` events.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket(`ws://localhost:8090/ws/7?token=${token}`);
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({event: 'message', content: 'hello'}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   console.log('Received:', msg);
//! };
//! ```

mod broadcast;
mod gateway;
mod handler;
mod hub;
mod messages;
mod presence;
mod router;

pub use gateway::{GatewayError, SessionGateway};
pub use handler::{websocket_handler, ConnectParams};
pub use hub::{Admission, ConnectionHub, HubConfig};
pub use messages::{DecodeError, InboundEvent, OutboundEvent, ReadNotice};
pub use presence::{ConnectionId, Frame};
pub use router::{EventRouter, RouterError};

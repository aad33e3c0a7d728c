//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle:
//! authorize, admit, stream events, clean up.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::messages::{DecodeError, InboundEvent};
use super::presence::Frame;
use super::router::EventRouter;
use crate::api::AppState;
use crate::auth::UserIdentity;
use crate::types::ConversationId;

/// Query parameters accepted on the upgrade request
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// Bearer token; checked after the upgrade so refusals carry a close code
    pub token: Option<String>,
}

/// WebSocket upgrade handler for `GET /ws/:conversation_id?token=...`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(conversation_id): Path<i64>,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let conversation = ConversationId(conversation_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, conversation, params.token))
}

/// Authorize an upgraded socket, then run its session
async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    conversation: ConversationId,
    token: Option<String>,
) {
    let user = match state.gateway.authorize(token.as_deref(), conversation).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(
                conversation_id = %conversation,
                error = %e,
                "WebSocket connection rejected"
            );
            let close = CloseFrame {
                code: e.close_code(),
                reason: Cow::Borrowed(""),
            };
            let _ = socket.send(Message::Close(Some(close))).await;
            return;
        }
    };

    run_session(socket, state, conversation, user).await;
}

/// Stream events for an admitted connection until either side gives up
async fn run_session(
    socket: WebSocket,
    state: Arc<AppState>,
    conversation: ConversationId,
    user: UserIdentity,
) {
    let hub = Arc::clone(&state.hub);
    let (sender, receiver) = socket.split();
    let (tx, rx) = hub.outbound_channel();

    // Cleanup (remove + state broadcast) runs when this guard drops.
    let admission = hub.admit_guarded(conversation, user.id, tx);
    let connection_id = admission.id();
    let released = admission.released();

    let send_timeout = hub.config().send_timeout;
    let mut send_task = tokio::spawn(write_frames(sender, rx, send_timeout));

    let router = EventRouter::new(
        Arc::clone(&hub),
        Arc::clone(&state.store),
        conversation,
        user.clone(),
    );
    let mut recv_task = tokio::spawn(read_events(receiver, router));

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
        _ = released.cancelled() => {
            // Evicted or replaced: stop dispatching now, give the writer one
            // send window to flush and close.
            recv_task.abort();
            if tokio::time::timeout(send_timeout, &mut send_task).await.is_err() {
                send_task.abort();
            }
            tracing::debug!(
                conversation_id = %conversation,
                user_id = %user.id,
                connection_id = %connection_id,
                "Connection released by hub"
            );
        }
    }

    tracing::info!(
        conversation_id = %conversation,
        user_id = %user.id,
        connection_id = %connection_id,
        "WebSocket session ended"
    );
    drop(admission);
}

/// Forward queued frames to the socket.
///
/// Ends when the hub drops the queue (replaced or evicted), when a write
/// fails, or when a write exceeds `send_timeout`.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Frame>,
    send_timeout: Duration,
) {
    while let Some(frame) = rx.recv().await {
        match tokio::time::timeout(send_timeout, sink.send(Message::Text(frame.to_string()))).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket send failed, closing connection");
                return;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = send_timeout.as_millis() as u64,
                    "WebSocket send timed out, closing connection"
                );
                return;
            }
        }
    }

    let close = CloseFrame {
        code: close_code::NORMAL,
        reason: Cow::Borrowed("connection released"),
    };
    let _ = tokio::time::timeout(send_timeout, sink.send(Message::Close(Some(close)))).await;
}

/// Decode and dispatch inbound frames until the client leaves or misbehaves
async fn read_events(mut stream: SplitStream<WebSocket>, router: EventRouter) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(msg) => {
                if !handle_ws_message(&router, msg).await {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket receive error");
                break;
            }
        }
    }
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(router: &EventRouter, message: Message) -> bool {
    let decoded = match message {
        Message::Text(text) => InboundEvent::decode(&text),
        Message::Binary(_) => Err(DecodeError::Binary),
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => return true,
        Message::Close(_) => {
            tracing::debug!("Client requested close");
            return false;
        }
    };

    let event = match decoded {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Undecodable frame, closing connection");
            return false;
        }
    };

    match router.dispatch(event).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Event dispatch failed, closing connection");
            false
        }
    }
}

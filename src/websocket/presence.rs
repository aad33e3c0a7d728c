//! Per-conversation presence and typing state

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::UserId;

/// Registry-assigned identifier of one admitted connection
pub type ConnectionId = Uuid;

/// A serialized outbound frame, shared by every recipient of a broadcast
pub type Frame = Arc<str>;

/// Sending half of a connection's outbound queue.
///
/// Dropping the handle (eviction, replacement, removal) cancels the token
/// its session watches, so the session stops reading right away.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub sender: mpsc::Sender<Frame>,
    released: CancellationToken,
}

impl ConnectionHandle {
    pub(crate) fn new(sender: mpsc::Sender<Frame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            released: CancellationToken::new(),
        }
    }

    /// Token cancelled once the hub lets go of this connection
    pub(crate) fn released(&self) -> CancellationToken {
        self.released.clone()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.released.cancel();
    }
}

/// Live state of one conversation.
///
/// A room is only kept in the registry while it has at least one connection
/// or one typer.
#[derive(Debug, Default)]
pub struct Room {
    pub(crate) connections: HashMap<UserId, ConnectionHandle>,
    pub(crate) typing: BTreeSet<UserId>,
}

impl Room {
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.typing.is_empty()
    }

    /// Online users, ascending
    pub fn online(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.connections.keys().copied().collect();
        users.sort_unstable();
        users
    }

    /// Typing users, ascending
    pub fn typing(&self) -> Vec<UserId> {
        self.typing.iter().copied().collect()
    }

    /// Drop a user's connection and typing flag.
    ///
    /// Returns the removed handle, if any.
    pub(crate) fn evict(&mut self, user: UserId) -> Option<ConnectionHandle> {
        self.typing.remove(&user);
        self.connections.remove(&user)
    }

    pub(crate) fn set_typing(&mut self, user: UserId, is_typing: bool) {
        if is_typing {
            self.typing.insert(user);
        } else {
            self.typing.remove(&user);
        }
    }
}

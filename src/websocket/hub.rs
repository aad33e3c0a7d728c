//! WebSocket Connection Hub
//!
//! Tracks which users are live on which conversations. Each conversation's
//! [`Room`] sits behind its own entry lock in a sharded map, so compound
//! updates on one conversation are atomic without serializing the others.
//!
//! Every method is synchronous: no lock is ever held across an `.await`.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::presence::{ConnectionHandle, ConnectionId, Frame, Room};
use crate::types::{ConversationId, UserId};

/// Manages all live conversation connections
pub struct ConnectionHub {
    /// ConversationId → Room (connections + typing set)
    pub(super) rooms: DashMap<ConversationId, Room>,
    /// Configuration
    config: HubConfig,
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Frames buffered per connection before it is treated as failed
    pub outbound_buffer: usize,
    /// Upper bound on a single transport write
    pub send_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 64,
            send_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Create a bounded outbound queue sized for one connection
    pub fn outbound_channel(&self) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        mpsc::channel(self.config.outbound_buffer.max(1))
    }

    /// Register `sender` as the live channel for `user` in `conversation`.
    ///
    /// A previous connection for the same pair is dropped without being
    /// closed. Broadcasts the updated presence state.
    pub fn admit(
        &self,
        conversation: ConversationId,
        user: UserId,
        sender: mpsc::Sender<Frame>,
    ) -> ConnectionId {
        self.register(conversation, user, sender).0
    }

    /// Admit and return a guard that cleans up when dropped
    pub fn admit_guarded(
        self: &Arc<Self>,
        conversation: ConversationId,
        user: UserId,
        sender: mpsc::Sender<Frame>,
    ) -> Admission {
        let (id, released) = self.register(conversation, user, sender);
        Admission {
            hub: Arc::clone(self),
            conversation,
            user,
            id,
            released,
        }
    }

    fn register(
        &self,
        conversation: ConversationId,
        user: UserId,
        sender: mpsc::Sender<Frame>,
    ) -> (ConnectionId, CancellationToken) {
        let handle = ConnectionHandle::new(sender);
        let (id, released) = (handle.id, handle.released());
        let replaced = self
            .rooms
            .entry(conversation)
            .or_default()
            .connections
            .insert(user, handle);

        if let Some(previous) = replaced {
            tracing::debug!(
                conversation_id = %conversation,
                user_id = %user,
                previous_connection = %previous.id,
                "Replaced existing connection"
            );
        }

        tracing::info!(
            conversation_id = %conversation,
            user_id = %user,
            connection_id = %id,
            "Connection admitted"
        );

        self.broadcast_state(conversation);
        (id, released)
    }

    /// Remove `user` from `conversation`, whichever connection it holds.
    ///
    /// Also clears the user's typing flag. Does not broadcast.
    pub fn remove(&self, conversation: ConversationId, user: UserId) -> bool {
        let removed = match self.rooms.get_mut(&conversation) {
            Some(mut room) => room.evict(user).is_some(),
            None => false,
        };
        self.drop_if_empty(conversation);
        removed
    }

    /// Remove `user` only if its registered connection is still `id`.
    ///
    /// A session whose connection was replaced must not evict its successor.
    /// A leftover typing flag is cleared when no connection is registered for
    /// `user`. Returns whether the presence state changed.
    pub fn remove_connection(
        &self,
        conversation: ConversationId,
        user: UserId,
        id: ConnectionId,
    ) -> bool {
        let (removed, changed) = match self.rooms.get_mut(&conversation) {
            Some(mut room) => match room.connections.get(&user).map(|handle| handle.id) {
                Some(current) if current == id => {
                    room.evict(user);
                    (true, true)
                }
                Some(_) => (false, false),
                None => (false, room.typing.remove(&user)),
            },
            None => (false, false),
        };
        self.drop_if_empty(conversation);

        if removed {
            tracing::info!(
                conversation_id = %conversation,
                user_id = %user,
                connection_id = %id,
                "Connection removed"
            );
        }
        changed
    }

    /// Flag or unflag `user` as typing, then broadcast the state.
    ///
    /// Only a user with a registered connection can start typing.
    pub fn set_typing(&self, conversation: ConversationId, user: UserId, is_typing: bool) {
        let changed = match self.rooms.get_mut(&conversation) {
            Some(mut room) => {
                if is_typing && !room.connections.contains_key(&user) {
                    false
                } else {
                    room.set_typing(user, is_typing);
                    true
                }
            }
            None => false,
        };
        self.drop_if_empty(conversation);

        if !changed {
            tracing::debug!(
                conversation_id = %conversation,
                user_id = %user,
                is_typing,
                "Typing update for unregistered connection ignored"
            );
            return;
        }

        tracing::trace!(
            conversation_id = %conversation,
            user_id = %user,
            is_typing,
            "Typing state changed"
        );

        self.broadcast_state(conversation);
    }

    /// Users with a live connection, ascending
    pub fn online_users(&self, conversation: ConversationId) -> Vec<UserId> {
        self.rooms
            .get(&conversation)
            .map(|room| room.online())
            .unwrap_or_default()
    }

    /// Users currently typing, ascending
    pub fn typing_users(&self, conversation: ConversationId) -> Vec<UserId> {
        self.rooms
            .get(&conversation)
            .map(|room| room.typing())
            .unwrap_or_default()
    }

    /// Whether the hub holds any state for `conversation`
    pub fn is_tracked(&self, conversation: ConversationId) -> bool {
        self.rooms.contains_key(&conversation)
    }

    /// Number of conversations with live state
    pub fn conversation_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total live connections across all conversations
    pub fn connection_count(&self) -> usize {
        self.rooms
            .iter()
            .map(|room| room.connections.len())
            .sum()
    }

    pub(super) fn drop_if_empty(&self, conversation: ConversationId) {
        if self
            .rooms
            .remove_if(&conversation, |_, room| room.is_empty())
            .is_some()
        {
            tracing::debug!(conversation_id = %conversation, "Conversation went idle");
        }
    }
}

/// Registration of one live connection.
///
/// Dropping it removes the connection (if it is still the registered one)
/// and broadcasts the updated presence, exactly once, on every exit path.
pub struct Admission {
    hub: Arc<ConnectionHub>,
    conversation: ConversationId,
    user: UserId,
    id: ConnectionId,
    released: CancellationToken,
}

impl Admission {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Cancelled once the hub drops this connection (evicted or replaced)
    pub fn released(&self) -> CancellationToken {
        self.released.clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.is_cancelled()
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self
            .hub
            .remove_connection(self.conversation, self.user, self.id)
        {
            self.hub.broadcast_state(self.conversation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const CONV: ConversationId = ConversationId(7);

    fn state_of(frame: &str) -> (Vec<i64>, Vec<i64>) {
        let value: serde_json::Value = serde_json::from_str(frame).unwrap();
        assert_eq!(value["event"], "state");
        let ids = |key: &str| -> Vec<i64> {
            value[key]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_i64().unwrap())
                .collect()
        };
        (ids("typing"), ids("online"))
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.outbound_buffer, 64);
        assert_eq!(config.send_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_admit_remove() {
        let hub = ConnectionHub::new(HubConfig::default());
        let (tx, _rx) = hub.outbound_channel();

        hub.admit(CONV, UserId(1), tx);
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.online_users(CONV), vec![UserId(1)]);

        assert!(hub.remove(CONV, UserId(1)));
        assert_eq!(hub.connection_count(), 0);
        assert!(!hub.is_tracked(CONV));
        assert!(!hub.remove(CONV, UserId(1)));
    }

    #[tokio::test]
    async fn test_admit_broadcasts_state() {
        let hub = ConnectionHub::new(HubConfig::default());
        let (tx1, mut rx1) = hub.outbound_channel();
        let (tx2, mut rx2) = hub.outbound_channel();

        hub.admit(CONV, UserId(1), tx1);
        let (_, online) = state_of(&rx1.try_recv().unwrap());
        assert_eq!(online, vec![1]);

        hub.admit(CONV, UserId(2), tx2);
        let (_, online) = state_of(&rx1.try_recv().unwrap());
        assert_eq!(online, vec![1, 2]);
        let (_, online) = state_of(&rx2.try_recv().unwrap());
        assert_eq!(online, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_readmission_replaces() {
        let hub = ConnectionHub::new(HubConfig::default());
        let (old_tx, mut old_rx) = hub.outbound_channel();
        let (new_tx, mut new_rx) = hub.outbound_channel();

        let old_id = hub.admit(CONV, UserId(1), old_tx);
        let new_id = hub.admit(CONV, UserId(1), new_tx);
        assert_ne!(old_id, new_id);
        assert_eq!(hub.online_users(CONV), vec![UserId(1)]);
        assert_eq!(hub.connection_count(), 1);

        // The old queue only holds its own admission state and is now closed.
        assert!(old_rx.try_recv().is_ok());
        assert!(matches!(
            old_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(new_rx.try_recv().is_ok());

        // Cleanup from the stale session leaves the new connection alone.
        assert!(!hub.remove_connection(CONV, UserId(1), old_id));
        assert_eq!(hub.online_users(CONV), vec![UserId(1)]);
        assert!(hub.remove_connection(CONV, UserId(1), new_id));
        assert!(!hub.is_tracked(CONV));
    }

    #[tokio::test]
    async fn test_typing_bucket_lifecycle() {
        let hub = ConnectionHub::new(HubConfig::default());
        let (tx, mut rx) = hub.outbound_channel();
        hub.admit(CONV, UserId(1), tx);
        let _ = rx.try_recv();

        hub.set_typing(CONV, UserId(1), true);
        assert_eq!(hub.typing_users(CONV), vec![UserId(1)]);
        let (typing, online) = state_of(&rx.try_recv().unwrap());
        assert_eq!(typing, vec![1]);
        assert_eq!(online, vec![1]);

        hub.set_typing(CONV, UserId(1), false);
        assert!(hub.typing_users(CONV).is_empty());
        let (typing, _) = state_of(&rx.try_recv().unwrap());
        assert!(typing.is_empty());
    }

    #[tokio::test]
    async fn test_remove_clears_typing_and_drops_room() {
        let hub = ConnectionHub::new(HubConfig::default());
        let (tx, _rx) = hub.outbound_channel();
        hub.admit(CONV, UserId(1), tx);
        hub.set_typing(CONV, UserId(1), true);

        hub.remove(CONV, UserId(1));
        assert!(hub.typing_users(CONV).is_empty());
        assert!(!hub.is_tracked(CONV));
        assert_eq!(hub.conversation_count(), 0);
    }

    #[tokio::test]
    async fn test_untyping_never_creates_room() {
        let hub = ConnectionHub::new(HubConfig::default());
        hub.set_typing(CONV, UserId(1), false);
        assert!(!hub.is_tracked(CONV));
    }

    #[tokio::test]
    async fn test_admission_guard_cleans_up_once() {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let (tx_a, _rx_a) = hub.outbound_channel();
        let (tx_b, mut rx_b) = hub.outbound_channel();

        let guard = hub.admit_guarded(CONV, UserId(1), tx_a);
        hub.admit(CONV, UserId(2), tx_b);
        hub.set_typing(CONV, UserId(1), true);
        while rx_b.try_recv().is_ok() {}

        drop(guard);

        let (typing, online) = state_of(&rx_b.try_recv().unwrap());
        assert!(typing.is_empty());
        assert_eq!(online, vec![2]);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_evicted_connection_cannot_leave_typing_behind() {
        let hub = Arc::new(ConnectionHub::new(HubConfig {
            outbound_buffer: 2,
            ..HubConfig::default()
        }));
        let (tx_a, _rx_a) = hub.outbound_channel();
        let (tx_b, mut rx_b) = hub.outbound_channel();

        let guard_a = hub.admit_guarded(CONV, UserId(1), tx_a);
        let guard_b = hub.admit_guarded(CONV, UserId(2), tx_b);
        while rx_b.try_recv().is_ok() {}

        // A never drains: its queue is full and this state evicts it
        hub.broadcast_state(CONV);
        assert!(guard_a.is_released());
        assert!(!guard_b.is_released());
        assert_eq!(hub.online_users(CONV), vec![UserId(2)]);

        let mut last = None;
        while let Ok(frame) = rx_b.try_recv() {
            last = Some(frame);
        }
        let (typing, online) = state_of(&last.unwrap());
        assert!(typing.is_empty());
        assert_eq!(online, vec![2]);

        // Late typing from the evicted session is ignored
        hub.set_typing(CONV, UserId(1), true);
        assert!(hub.typing_users(CONV).is_empty());
        assert!(rx_b.try_recv().is_err());

        // Its cleanup changes nothing, so nothing is broadcast
        drop(guard_a);
        assert!(rx_b.try_recv().is_err());

        drop(guard_b);
        assert!(!hub.is_tracked(CONV));
        assert_eq!(hub.conversation_count(), 0);
    }

    #[tokio::test]
    async fn test_guarded_remove_clears_orphaned_typing() {
        let hub = ConnectionHub::new(HubConfig::default());
        hub.rooms
            .entry(CONV)
            .or_default()
            .set_typing(UserId(1), true);

        assert!(hub.remove_connection(CONV, UserId(1), Uuid::new_v4()));
        assert!(!hub.is_tracked(CONV));
    }

    #[tokio::test]
    async fn test_replaced_session_is_released() {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let (old_tx, _old_rx) = hub.outbound_channel();
        let (new_tx, _new_rx) = hub.outbound_channel();

        let old = hub.admit_guarded(CONV, UserId(1), old_tx);
        let new = hub.admit_guarded(CONV, UserId(1), new_tx);
        assert!(old.is_released());
        assert!(!new.is_released());

        hub.set_typing(CONV, UserId(1), true);
        drop(old);
        assert_eq!(hub.typing_users(CONV), vec![UserId(1)]);
        assert_eq!(hub.online_users(CONV), vec![UserId(1)]);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_keep_every_user() {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let mut receivers = Vec::new();
        let mut handles = Vec::new();

        for user in 0..32 {
            let (tx, rx) = hub.outbound_channel();
            receivers.push(rx);
            let hub = Arc::clone(&hub);
            handles.push(tokio::spawn(async move {
                hub.admit(CONV, UserId(user), tx);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(hub.online_users(CONV).len(), 32);

        let mut handles = Vec::new();
        for user in 0..32 {
            let hub = Arc::clone(&hub);
            handles.push(tokio::spawn(async move {
                hub.remove(CONV, UserId(user));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(!hub.is_tracked(CONV));
    }
}

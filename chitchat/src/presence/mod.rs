//! In-process presence index for connected chat clients.
//!
//! Maps an account id to its live socket's outbound channel. One entry per
//! account: a newer connection replaces the older one, and a disconnect only
//! removes the entry if the departing connection still owns it. Entries are
//! identified by a per-connection id so a stale socket's teardown cannot
//! evict its replacement.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::auth::UserId;

/// A connected client: its connection id and the channel that feeds its
/// socket writer task.
#[derive(Debug, Clone)]
pub struct OnlineEntry {
    pub connection_id: Uuid,
    pub sender: UnboundedSender<String>,
}

/// Registry of currently connected accounts.
#[derive(Default)]
pub struct PresenceIndex {
    online: Mutex<HashMap<UserId, OnlineEntry>>,
}

impl PresenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any previous one for the account.
    /// Returns the new connection's id.
    pub fn connect(&self, user_id: UserId, sender: UnboundedSender<String>) -> Uuid {
        let connection_id = Uuid::new_v4();
        let entry = OnlineEntry {
            connection_id,
            sender,
        };
        self.online.lock().unwrap().insert(user_id, entry);
        connection_id
    }

    /// Remove the entry owned by the given connection, returning the account
    /// it belonged to. A connection that was already replaced finds no entry
    /// and removes nothing.
    pub fn disconnect(&self, connection_id: Uuid) -> Option<UserId> {
        let mut online = self.online.lock().unwrap();
        let user_id = online
            .iter()
            .find(|(_, entry)| entry.connection_id == connection_id)
            .map(|(user_id, _)| *user_id)?;
        online.remove(&user_id);
        Some(user_id)
    }

    /// Outbound channel for an account, if it is connected.
    pub fn sender_for(&self, user_id: UserId) -> Option<UnboundedSender<String>> {
        self.online
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|entry| entry.sender.clone())
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online.lock().unwrap().contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.online.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.lock().unwrap().is_empty()
    }
}

//! Room registry and broadcast router.
//!
//! Each live connection registers an outbound sender here, plus an explicit
//! set of channel ids it is subscribed to. "Publish to channel" reaches
//! exactly the subscribed connections; "publish to all" reaches every live
//! connection. Delivery order within a room is publish-call order; there is
//! no reordering buffer and no sequence numbers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use uuid::Uuid;

use palaver_shared::events::ServerEvent;

/// Identifies one live connection.
pub type ConnectionId = Uuid;

struct Connection {
    sender: UnboundedSender<ServerEvent>,
    /// Channel ids this connection receives broadcasts for. This table is
    /// the record of truth for room membership, not the transport.
    channels: HashSet<Uuid>,
}

/// The routing table, shared by all sessions.
#[derive(Clone)]
pub struct Rooms {
    inner: Arc<RwLock<HashMap<ConnectionId, Connection>>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a freshly accepted connection with its outbound sender.
    pub async fn register(&self, conn: ConnectionId, sender: UnboundedSender<ServerEvent>) {
        self.inner.write().await.insert(
            conn,
            Connection {
                sender,
                channels: HashSet::new(),
            },
        );
    }

    /// Drop a connection and all of its subscriptions.
    pub async fn unregister(&self, conn: ConnectionId) {
        self.inner.write().await.remove(&conn);
    }

    /// Subscribe a connection to a channel's room.
    pub async fn subscribe(&self, conn: ConnectionId, channel_id: Uuid) {
        if let Some(connection) = self.inner.write().await.get_mut(&conn) {
            connection.channels.insert(channel_id);
        }
    }

    /// Send one event to one connection. A closed receiver is ignored; the
    /// session cleanup will unregister it.
    pub async fn send_to(&self, conn: ConnectionId, event: ServerEvent) {
        if let Some(connection) = self.inner.read().await.get(&conn) {
            let _ = connection.sender.send(event);
        }
    }

    /// Fan an event out to every connection subscribed to a channel.
    /// `except` excludes one connection (typing indicators and join notices
    /// skip their originator; message fan-out does not).
    pub async fn publish_to_channel(
        &self,
        channel_id: Uuid,
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) {
        let map = self.inner.read().await;
        for (id, connection) in map.iter() {
            if Some(*id) == except {
                continue;
            }
            if connection.channels.contains(&channel_id) {
                let _ = connection.sender.send(event.clone());
            }
        }
    }

    /// Fan an event out to every live connection.
    pub async fn publish_to_all(&self, event: ServerEvent) {
        let map = self.inner.read().await;
        for connection in map.values() {
            let _ = connection.sender.send(event.clone());
        }
    }
}

impl Default for Rooms {
    fn default() -> Self {
        Self::new()
    }
}

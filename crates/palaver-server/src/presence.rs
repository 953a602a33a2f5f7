//! Presence registry: which connections are live, and who they belong to.
//!
//! Entries are keyed by connection so a disconnect removes exactly one, but
//! the broadcast snapshot is identity-level: several connections from the
//! same account collapse to one username.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::Identity;
use crate::rooms::ConnectionId;

/// Process-wide table of live, authenticated connections.
#[derive(Clone)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<HashMap<ConnectionId, Identity>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn add(&self, conn: ConnectionId, identity: Identity) {
        self.inner.write().await.insert(conn, identity);
    }

    pub async fn remove(&self, conn: ConnectionId) -> Option<Identity> {
        self.inner.write().await.remove(&conn)
    }

    /// Distinct online usernames, sorted for a stable broadcast order.
    pub async fn snapshot(&self) -> Vec<String> {
        let map = self.inner.read().await;
        let mut names: Vec<String> = map.values().map(|i| i.username.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Number of live connections (not identities).
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: name.to_string(),
        }
    }

    #[tokio::test]
    async fn add_and_remove() {
        let presence = PresenceRegistry::new();
        let conn = Uuid::new_v4();
        presence.add(conn, identity("ada")).await;
        assert_eq!(presence.snapshot().await, vec!["ada"]);

        let removed = presence.remove(conn).await.unwrap();
        assert_eq!(removed.username, "ada");
        assert!(presence.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_dedupes_by_identity() {
        let presence = PresenceRegistry::new();
        let ada = identity("ada");
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        presence.add(first, ada.clone()).await;
        presence.add(second, ada.clone()).await;
        presence.add(Uuid::new_v4(), identity("grace")).await;

        assert_eq!(presence.snapshot().await, vec!["ada", "grace"]);

        // Closing one of ada's tabs keeps her listed.
        presence.remove(first).await;
        assert_eq!(presence.snapshot().await, vec!["ada", "grace"]);
    }
}

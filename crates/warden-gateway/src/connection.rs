use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// A connected operator WebSocket client.
#[derive(Debug)]
pub struct Connection {
    pub id: Uuid,
    /// Set once the client presents a valid pairing code.
    pub authenticated: bool,
    pub tx: mpsc::UnboundedSender<String>,
}

/// Manages active operator connections.
///
/// Approval requests and output frames only go to authenticated
/// connections; the pre-auth window sees nothing but the welcome
/// message and auth replies.
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
        })
    }

    pub async fn add(&self, conn: Connection) {
        let id = conn.id;
        self.connections.write().await.insert(id, conn);
        tracing::info!(connection_id = %id, "Connection added");
    }

    pub async fn remove(&self, id: Uuid) {
        self.connections.write().await.remove(&id);
        tracing::info!(connection_id = %id, "Connection removed");
    }

    /// Mark a connection as authenticated. Returns false for unknown ids.
    pub async fn mark_authenticated(&self, id: Uuid) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get_mut(&id) {
            Some(conn) => {
                conn.authenticated = true;
                tracing::info!(connection_id = %id, "Connection authenticated");
                true
            }
            None => false,
        }
    }

    pub async fn is_authenticated(&self, id: Uuid) -> bool {
        self.connections
            .read()
            .await
            .get(&id)
            .is_some_and(|conn| conn.authenticated)
    }

    /// Send to one connection regardless of auth state.
    pub async fn send_to(&self, id: Uuid, message: &str) {
        if let Some(conn) = self.connections.read().await.get(&id) {
            let _ = conn.tx.send(message.to_string());
        }
    }

    /// Broadcast to every authenticated connection.
    pub async fn broadcast(&self, message: &str) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            if conn.authenticated {
                let _ = conn.tx.send(message.to_string());
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn authenticated_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.authenticated)
            .count()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn connection(authenticated: bool) -> (Connection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Connection {
                id: Uuid::new_v4(),
                authenticated,
                tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn broadcast_skips_unauthenticated_connections() {
        let manager = ConnectionManager::new();
        let (pre_auth, mut rx_pre) = connection(false);
        let (post_auth, mut rx_post) = connection(true);
        manager.add(pre_auth).await;
        manager.add(post_auth).await;

        manager.broadcast("hello").await;

        assert_eq!(rx_post.recv().await.unwrap(), "hello");
        assert!(rx_pre.try_recv().is_err());
    }

    #[tokio::test]
    async fn mark_authenticated_flips_the_flag() {
        let manager = ConnectionManager::new();
        let (conn, mut rx) = connection(false);
        let id = conn.id;
        manager.add(conn).await;

        assert!(!manager.is_authenticated(id).await);
        assert!(manager.mark_authenticated(id).await);
        assert!(manager.is_authenticated(id).await);
        assert_eq!(manager.authenticated_count().await, 1);

        manager.broadcast("now you see me").await;
        assert_eq!(rx.recv().await.unwrap(), "now you see me");
    }

    #[tokio::test]
    async fn mark_authenticated_on_unknown_id_is_false() {
        let manager = ConnectionManager::new();
        assert!(!manager.mark_authenticated(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn remove_drops_the_connection() {
        let manager = ConnectionManager::new();
        let (conn, _rx) = connection(true);
        let id = conn.id;
        manager.add(conn).await;
        assert_eq!(manager.connection_count().await, 1);

        manager.remove(id).await;
        assert_eq!(manager.connection_count().await, 0);
        assert!(!manager.is_authenticated(id).await);
    }
}

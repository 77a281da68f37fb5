//! Connection registry
//!
//! Tracks joined connections grouped by game and fans messages out to
//! them. Broadcasts snapshot the member list first, send without holding
//! the lock, and evict every connection whose send failed.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::AppError;
use crate::message::{PlayerInfo, ServerMessage};
use crate::types::{ConnectionId, PlayerId, SessionId};

#[derive(Debug, Default)]
struct Inner {
    /// Joined clients per game, in join order
    by_session: HashMap<SessionId, Vec<Client>>,
    /// Reverse index: connection -> game
    by_connection: HashMap<ConnectionId, SessionId>,
}

impl Inner {
    fn remove(&mut self, id: ConnectionId) -> Option<Client> {
        let session = self.by_connection.remove(&id)?;
        let clients = self.by_session.get_mut(&session)?;
        let pos = clients.iter().position(|c| c.id == id)?;
        let client = clients.remove(pos);
        if clients.is_empty() {
            self.by_session.remove(&session);
        }
        Some(client)
    }
}

/// Registry of joined WebSocket connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a joined connection
    ///
    /// Fails with `NameTaken` if the display name is already used in the
    /// game; the check and the insert happen under one lock.
    pub async fn add(
        &self,
        session: &SessionId,
        player_id: PlayerId,
        name: String,
        id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;

        let clients = inner.by_session.entry(session.clone()).or_default();
        if clients.iter().any(|c| c.name == name) {
            return Err(AppError::NameTaken(name));
        }
        clients.push(Client::new(id, player_id, name, sender));
        inner.by_connection.insert(id, session.clone());

        debug!("Connection {} added to game {}", id, session);
        Ok(())
    }

    /// Remove a connection; true only if it was registered
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.inner.write().await.remove(id);
        if let Some(client) = &removed {
            debug!("Connection {} ({}) removed", id, client.name);
        }
        removed.is_some()
    }

    /// Snapshot of the connections joined to a game
    pub async fn connections_for(&self, session: &SessionId) -> Vec<Client> {
        self.inner
            .read()
            .await
            .by_session
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    /// Players currently connected to a game, in join order
    pub async fn roster(&self, session: &SessionId) -> Vec<PlayerInfo> {
        self.inner
            .read()
            .await
            .by_session
            .get(session)
            .map(|clients| clients.iter().map(Client::info).collect())
            .unwrap_or_default()
    }

    /// Case-sensitive display name check within one game
    pub async fn name_taken(&self, session: &SessionId, name: &str) -> bool {
        self.inner
            .read()
            .await
            .by_session
            .get(session)
            .is_some_and(|clients| clients.iter().any(|c| c.name == name))
    }

    /// Display name of a connected player
    pub async fn username(&self, session: &SessionId, player_id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .by_session
            .get(session)?
            .iter()
            .find(|c| c.player_id == player_id)
            .map(|c| c.name.clone())
    }

    /// Whether a connection is still registered (false after eviction)
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.inner.read().await.by_connection.contains_key(&id)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.by_connection.len()
    }

    /// Send a message to every connection joined to a game
    ///
    /// Connections whose send fails are removed and the rest of the game
    /// gets a fresh roster. Returns the number of connections the message
    /// was queued for.
    pub async fn broadcast(&self, session: &SessionId, msg: &ServerMessage) -> usize {
        let clients = self.connections_for(session).await;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for client in &clients {
            match client.send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Dropping connection {} ({}) in game {}: {}", client.id, client.name, session, e);
                    failed.push(client.id);
                }
            }
        }

        if !failed.is_empty() {
            let remaining = {
                let mut inner = self.inner.write().await;
                for id in &failed {
                    inner.remove(*id);
                }
                inner.by_session.get(session).cloned().unwrap_or_default()
            };
            info!("Game {}: evicted {} connection(s) during broadcast", session, failed.len());

            // Later broadcasts evict anyone who cannot take the roster
            let roster = ServerMessage::RosterUpdate {
                players: remaining.iter().map(Client::info).collect(),
            };
            for client in &remaining {
                let _ = client.send(roster.clone());
            }
        }

        debug!("Broadcast to game {}: {}/{} delivered", session, delivered, clients.len());
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(id: &str) -> SessionId {
        SessionId(id.to_string())
    }

    async fn join(
        registry: &ConnectionRegistry,
        session: &str,
        player: &str,
        name: &str,
    ) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let id = ConnectionId::new();
        registry
            .add(&sid(session), player.into(), name.into(), id, tx)
            .await
            .unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = join(&registry, "1000", "p1", "Alice").await;

        assert_eq!(registry.connections_for(&sid("1000")).await.len(), 1);
        assert_eq!(registry.connection_count().await, 1);
        assert!(registry.remove(id).await);
        assert!(!registry.remove(id).await);
        assert!(registry.connections_for(&sid("1000")).await.is_empty());
    }

    #[tokio::test]
    async fn test_name_uniqueness_scoped_to_game() {
        let registry = ConnectionRegistry::new();
        let _a = join(&registry, "1000", "p1", "Alice").await;

        assert!(registry.name_taken(&sid("1000"), "Alice").await);
        assert!(!registry.name_taken(&sid("1000"), "alice").await);
        assert!(!registry.name_taken(&sid("2000"), "Alice").await);

        let (tx, _rx) = mpsc::channel(8);
        let res = registry
            .add(&sid("1000"), "p2".into(), "Alice".into(), ConnectionId::new(), tx)
            .await;
        assert!(matches!(res, Err(AppError::NameTaken(_))));

        let _b = join(&registry, "2000", "p3", "Alice").await;
        assert_eq!(registry.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_roster_and_username() {
        let registry = ConnectionRegistry::new();
        let _a = join(&registry, "1000", "p1", "Alice").await;
        let _b = join(&registry, "1000", "p2", "Bob").await;

        let roster = registry.roster(&sid("1000")).await;
        let names: Vec<_> = roster.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(registry.username(&sid("1000"), "p2").await.as_deref(), Some("Bob"));
        assert!(registry.username(&sid("1000"), "p9").await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_evicts_dead_connection() {
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = join(&registry, "1000", "p1", "Alice").await;
        let (dead, rx_dead) = join(&registry, "1000", "p2", "Bob").await;
        let (_c, mut rx_c) = join(&registry, "1000", "p3", "Carol").await;
        drop(rx_dead);

        let delivered = registry
            .broadcast(&sid("1000"), &ServerMessage::system("17"))
            .await;

        assert_eq!(delivered, 2);
        for rx in [&mut rx_a, &mut rx_c] {
            assert!(matches!(rx.try_recv(), Ok(ServerMessage::Chat { .. })));
            match rx.try_recv() {
                Ok(ServerMessage::RosterUpdate { players }) => {
                    let names: Vec<_> = players.iter().map(|p| p.name.as_str()).collect();
                    assert_eq!(names, vec!["Alice", "Carol"]);
                }
                other => panic!("expected roster after eviction, got {:?}", other),
            }
        }
        assert!(!registry.contains(dead).await);
        assert!(!registry.remove(dead).await);
        assert_eq!(registry.connections_for(&sid("1000")).await.len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_evicts_full_connection() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let slow = ConnectionId::new();
        registry
            .add(&sid("1000"), "p1".into(), "Slow".into(), slow, tx)
            .await
            .unwrap();

        assert_eq!(registry.broadcast(&sid("1000"), &ServerMessage::system("a")).await, 1);
        assert_eq!(registry.broadcast(&sid("1000"), &ServerMessage::system("b")).await, 0);
        assert!(!registry.name_taken(&sid("1000"), "Slow").await);
    }

    #[tokio::test]
    async fn test_broadcast_is_scoped_to_game() {
        let registry = ConnectionRegistry::new();
        let (_a, mut rx_a) = join(&registry, "1000", "p1", "Alice").await;
        let (_b, mut rx_b) = join(&registry, "2000", "p2", "Bob").await;

        registry.broadcast(&sid("2000"), &ServerMessage::system("hi")).await;
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
        assert_eq!(registry.broadcast(&sid("3000"), &ServerMessage::system("x")).await, 0);
    }
}

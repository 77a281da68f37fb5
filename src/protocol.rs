//! Per-connection protocol state machine
//!
//! Interprets inbound messages for one WebSocket connection:
//! `Unauthenticated → Authenticated → Closed`. Only join, chat,
//! select-card and leave are handled here; draws and closes come from the
//! service layer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::card::{Card, CardLayout};
use crate::connections::ConnectionRegistry;
use crate::error::AppError;
use crate::message::{ClientMessage, ErrorCode, ServerMessage};
use crate::registry::SessionRegistry;
use crate::types::{ConnectionId, PlayerId, SessionId};

/// Connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerState {
    /// Waiting for a join
    Unauthenticated,
    /// Joined as this player
    Authenticated { player_id: PlayerId, name: String },
    /// Left or disconnected; the transport should drop the channel
    Closed,
}

/// Protocol handler for a single connection bound to one game
pub struct SessionProtocolHandler {
    session: SessionId,
    connection_id: ConnectionId,
    sender: mpsc::Sender<ServerMessage>,
    state: HandlerState,
    games: Arc<SessionRegistry>,
    connections: Arc<ConnectionRegistry>,
    card_layout: CardLayout,
}

impl SessionProtocolHandler {
    pub fn new(
        session: SessionId,
        connection_id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
        games: Arc<SessionRegistry>,
        connections: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            session,
            connection_id,
            sender,
            state: HandlerState::Unauthenticated,
            games,
            connections,
            card_layout: CardLayout::default(),
        }
    }

    /// Layout that client-selected cards are validated against
    pub fn with_card_layout(mut self, layout: CardLayout) -> Self {
        self.card_layout = layout;
        self
    }

    pub fn state(&self) -> &HandlerState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == HandlerState::Closed
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Process one inbound message
    ///
    /// Returns false when the transport should close the connection.
    pub async fn handle(&mut self, msg: ClientMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.was_evicted().await {
            return false;
        }

        let result = match msg {
            ClientMessage::Join {
                session_id,
                player_id,
                name,
            } => self.handle_join(session_id, player_id, name).await,
            ClientMessage::Chat { text, .. } => self.handle_chat(text).await,
            ClientMessage::SelectCard { player_id, card } => {
                self.handle_select_card(player_id, card).await
            }
            ClientMessage::Leave => {
                self.handle_leave().await;
                return false;
            }
            ClientMessage::Unknown => Err(AppError::UnknownMessageType),
        };

        if let Err(e) = result {
            self.reply_error(e);
        }
        true
    }

    /// Send an error notice to this connection only
    pub fn send_error(&self, message: impl Into<String>) {
        self.reply(ServerMessage::Error {
            code: ErrorCode::InvalidMessage,
            message: message.into(),
        });
    }

    /// Cleanup after the transport lost the connection
    ///
    /// Same as a leave, but the dead channel is already out of the
    /// registry before the roster goes out.
    pub async fn on_disconnect(&mut self) {
        if let HandlerState::Authenticated { name, .. } = &self.state {
            info!("Player '{}' disconnected from game {}", name, self.session);
        }
        self.teardown().await;
    }

    fn reply_error(&self, err: AppError) {
        warn!("Connection {} in game {}: {}", self.connection_id, self.session, err);
        self.reply(err.into());
    }

    fn reply(&self, msg: ServerMessage) {
        if self.sender.try_send(msg).is_err() {
            debug!("Could not queue reply for connection {}", self.connection_id);
        }
    }

    /// A broadcast dropped this connection after its channel failed.
    /// Finish the cleanup the eviction skipped and close.
    async fn was_evicted(&mut self) -> bool {
        let HandlerState::Authenticated { player_id, name } = &self.state else {
            return false;
        };
        if self.connections.contains(self.connection_id).await {
            return false;
        }

        warn!("Player '{}' was evicted from game {}, closing connection", name, self.session);
        self.games.remove_card(&self.session, player_id).await;
        self.state = HandlerState::Closed;
        true
    }

    async fn handle_join(
        &mut self,
        session_id: String,
        player_id: PlayerId,
        name: String,
    ) -> Result<(), AppError> {
        if !matches!(self.state, HandlerState::Unauthenticated) {
            return Err(AppError::AlreadyJoined);
        }
        if session_id.trim() != self.session.as_str() {
            return Err(AppError::GameIdMismatch {
                expected: self.session.clone(),
                got: session_id,
            });
        }
        if !self.games.exists(&self.session).await {
            return Err(AppError::GameNotFound(self.session.clone()));
        }

        self.connections
            .add(
                &self.session,
                player_id.clone(),
                name.clone(),
                self.connection_id,
                self.sender.clone(),
            )
            .await?;

        info!("Player '{}' ({}) joined game {}", name, player_id, self.session);
        self.state = HandlerState::Authenticated { player_id, name };
        self.broadcast_roster().await;
        Ok(())
    }

    async fn handle_chat(&mut self, text: String) -> Result<(), AppError> {
        let HandlerState::Authenticated { player_id, name } = &self.state else {
            return Err(AppError::NotJoined);
        };

        debug!("Chat from '{}' in game {}", name, self.session);
        let msg = ServerMessage::Chat {
            player_id: player_id.clone(),
            name: name.clone(),
            text,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.connections.broadcast(&self.session, &msg).await;
        Ok(())
    }

    async fn handle_select_card(
        &mut self,
        player_id: PlayerId,
        card: Card,
    ) -> Result<(), AppError> {
        let HandlerState::Authenticated {
            player_id: bound, name,
        } = &self.state
        else {
            return Err(AppError::NotJoined);
        };
        if &player_id != bound {
            return Err(AppError::PlayerIdMismatch);
        }
        card.validate(&self.card_layout)?;

        let card_id = card.id.clone();
        match self.games.replace_card(&self.session, bound, card).await {
            Some(reset) => {
                info!(
                    "Player '{}' selected card '{}' in game {} (bookkeeping reset: {})",
                    name, card_id, self.session, reset
                );
                Ok(())
            }
            None => Err(AppError::GameNotFound(self.session.clone())),
        }
    }

    async fn handle_leave(&mut self) {
        if let HandlerState::Authenticated { name, .. } = &self.state {
            info!("Player '{}' left game {}", name, self.session);
        }
        self.teardown().await;
    }

    /// Unregister, drop the player's card, and tell the rest of the game
    async fn teardown(&mut self) {
        let previous = std::mem::replace(&mut self.state, HandlerState::Closed);
        let HandlerState::Authenticated { player_id, .. } = previous else {
            return;
        };

        self.connections.remove(self.connection_id).await;
        self.games.remove_card(&self.session, &player_id).await;
        self.broadcast_roster().await;
    }

    async fn broadcast_roster(&self) {
        let players = self.connections.roster(&self.session).await;
        self.connections
            .broadcast(&self.session, &ServerMessage::RosterUpdate { players })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardGenerator;

    struct Fixture {
        games: Arc<SessionRegistry>,
        connections: Arc<ConnectionRegistry>,
    }

    impl Fixture {
        async fn new(game: &str) -> Self {
            let games = Arc::new(SessionRegistry::new());
            games.create(Some(game)).await.unwrap();
            Self {
                games,
                connections: Arc::new(ConnectionRegistry::new()),
            }
        }

        fn handler(&self, game: &str) -> (SessionProtocolHandler, mpsc::Receiver<ServerMessage>) {
            let (tx, rx) = mpsc::channel(32);
            let handler = SessionProtocolHandler::new(
                SessionId(game.to_string()),
                ConnectionId::new(),
                tx,
                Arc::clone(&self.games),
                Arc::clone(&self.connections),
            );
            (handler, rx)
        }
    }

    fn join(game: &str, player: &str, name: &str) -> ClientMessage {
        ClientMessage::Join {
            session_id: game.into(),
            player_id: player.into(),
            name: name.into(),
        }
    }

    fn chat(text: &str) -> ClientMessage {
        ClientMessage::Chat {
            text: text.into(),
            player_id: Some("spoofed".into()),
            name: Some("Mallory".into()),
            timestamp: Some(0),
        }
    }

    fn expect_error(rx: &mut mpsc::Receiver<ServerMessage>, expected: ErrorCode) {
        match rx.try_recv() {
            Ok(ServerMessage::Error { code, .. }) => assert_eq!(code, expected),
            other => panic!("expected error {:?}, got {:?}", expected, other),
        }
    }

    #[tokio::test]
    async fn test_join_broadcasts_roster() {
        let fx = Fixture::new("1000").await;
        let (mut alice, mut rx) = fx.handler("1000");

        assert!(alice.handle(join("1000", "p1", "Alice")).await);
        assert!(matches!(alice.state(), HandlerState::Authenticated { .. }));

        match rx.try_recv() {
            Ok(ServerMessage::RosterUpdate { players }) => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].name, "Alice");
            }
            other => panic!("expected roster, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_rejections_keep_connection_open() {
        let fx = Fixture::new("1000").await;
        let (mut handler, mut rx) = fx.handler("1000");

        assert!(handler.handle(join("2000", "p1", "Alice")).await);
        expect_error(&mut rx, ErrorCode::GameIdMismatch);
        assert_eq!(handler.state(), &HandlerState::Unauthenticated);

        let (mut orphan, mut orphan_rx) = fx.handler("3000");
        assert!(orphan.handle(join("3000", "p1", "Alice")).await);
        expect_error(&mut orphan_rx, ErrorCode::GameNotFound);
        assert_eq!(orphan.state(), &HandlerState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let fx = Fixture::new("1000").await;
        let (mut first, _rx1) = fx.handler("1000");
        let (mut second, mut rx2) = fx.handler("1000");

        first.handle(join("1000", "p1", "Alice")).await;
        assert!(second.handle(join("1000", "p2", "Alice")).await);
        expect_error(&mut rx2, ErrorCode::NameTaken);
        assert_eq!(second.state(), &HandlerState::Unauthenticated);

        assert!(second.handle(join("1000", "p2", "Alicia")).await);
        assert!(matches!(second.state(), HandlerState::Authenticated { .. }));
    }

    #[tokio::test]
    async fn test_second_join_rejected() {
        let fx = Fixture::new("1000").await;
        let (mut handler, mut rx) = fx.handler("1000");
        handler.handle(join("1000", "p1", "Alice")).await;
        let _roster = rx.try_recv();

        assert!(handler.handle(join("1000", "p1", "Alice")).await);
        expect_error(&mut rx, ErrorCode::AlreadyJoined);
        assert!(matches!(handler.state(), HandlerState::Authenticated { .. }));
    }

    #[tokio::test]
    async fn test_unauthenticated_actions_rejected() {
        let fx = Fixture::new("1000").await;
        let (mut handler, mut rx) = fx.handler("1000");

        assert!(handler.handle(chat("hi")).await);
        expect_error(&mut rx, ErrorCode::NotJoined);

        let card = CardGenerator::default().generate();
        assert!(
            handler
                .handle(ClientMessage::SelectCard {
                    player_id: "p1".into(),
                    card
                })
                .await
        );
        expect_error(&mut rx, ErrorCode::NotJoined);
    }

    #[tokio::test]
    async fn test_chat_is_stamped_server_side() {
        let fx = Fixture::new("1000").await;
        let (mut alice, mut rx_a) = fx.handler("1000");
        let (mut bob, mut rx_b) = fx.handler("1000");
        alice.handle(join("1000", "p1", "Alice")).await;
        bob.handle(join("1000", "p2", "Bob")).await;
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        alice.handle(chat("merhaba")).await;

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.try_recv() {
                Ok(ServerMessage::Chat {
                    player_id,
                    name,
                    text,
                    timestamp,
                }) => {
                    assert_eq!(player_id, "p1");
                    assert_eq!(name, "Alice");
                    assert_eq!(text, "merhaba");
                    assert!(timestamp > 0);
                }
                other => panic!("expected chat, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_select_card_checks_player() {
        let fx = Fixture::new("1000").await;
        let (mut handler, mut rx) = fx.handler("1000");
        handler.handle(join("1000", "p1", "Alice")).await;
        let _roster = rx.try_recv();
        let card = CardGenerator::default().generate();

        handler
            .handle(ClientMessage::SelectCard {
                player_id: "p2".into(),
                card: card.clone(),
            })
            .await;
        expect_error(&mut rx, ErrorCode::PlayerIdMismatch);

        handler
            .handle(ClientMessage::SelectCard {
                player_id: "p1".into(),
                card: card.clone(),
            })
            .await;
        assert!(rx.try_recv().is_err(), "card selection is private");
        let session = SessionId("1000".into());
        assert_eq!(fx.games.get_card(&session, "p1").await, Some(card));
    }

    #[tokio::test]
    async fn test_select_invalid_card_rejected() {
        let fx = Fixture::new("1000").await;
        let (mut handler, mut rx) = fx.handler("1000");
        handler.handle(join("1000", "p1", "Alice")).await;
        let _roster = rx.try_recv();

        let mut card = CardGenerator::default().generate();
        card.rows.pop();
        handler
            .handle(ClientMessage::SelectCard {
                player_id: "p1".into(),
                card,
            })
            .await;
        expect_error(&mut rx, ErrorCode::InvalidCard);
    }

    #[tokio::test]
    async fn test_unknown_message_keeps_connection() {
        let fx = Fixture::new("1000").await;
        let (mut handler, mut rx) = fx.handler("1000");
        assert!(handler.handle(ClientMessage::Unknown).await);
        expect_error(&mut rx, ErrorCode::UnknownMessageType);
    }

    #[tokio::test]
    async fn test_leave_cleans_up() {
        let fx = Fixture::new("1000").await;
        let session = SessionId("1000".into());
        let (mut alice, _rx_a) = fx.handler("1000");
        let (mut bob, mut rx_b) = fx.handler("1000");
        alice.handle(join("1000", "p1", "Alice")).await;
        bob.handle(join("1000", "p2", "Bob")).await;
        alice
            .handle(ClientMessage::SelectCard {
                player_id: "p1".into(),
                card: CardGenerator::default().generate(),
            })
            .await;
        while rx_b.try_recv().is_ok() {}

        assert!(!alice.handle(ClientMessage::Leave).await);
        assert!(alice.is_closed());
        assert!(fx.games.get_card(&session, "p1").await.is_none());
        assert!(!fx.connections.name_taken(&session, "Alice").await);

        match rx_b.try_recv() {
            Ok(ServerMessage::RosterUpdate { players }) => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].name, "Bob");
            }
            other => panic!("expected roster, got {:?}", other),
        }

        // Closed handlers ignore further input
        assert!(!alice.handle(chat("still here?")).await);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up_without_own_broadcast() {
        let fx = Fixture::new("1000").await;
        let session = SessionId("1000".into());
        let (mut alice, rx_a) = fx.handler("1000");
        let (mut bob, mut rx_b) = fx.handler("1000");
        alice.handle(join("1000", "p1", "Alice")).await;
        bob.handle(join("1000", "p2", "Bob")).await;
        while rx_b.try_recv().is_ok() {}

        drop(rx_a);
        alice.on_disconnect().await;

        assert!(alice.is_closed());
        assert_eq!(fx.connections.roster(&session).await.len(), 1);
        assert!(matches!(rx_b.try_recv(), Ok(ServerMessage::RosterUpdate { .. })));
    }

    #[tokio::test]
    async fn test_evicted_connection_closes_on_next_message() {
        let fx = Fixture::new("1000").await;
        let session = SessionId("1000".into());
        let (tx, _slow_rx) = mpsc::channel(1);
        let mut slow = SessionProtocolHandler::new(
            session.clone(),
            ConnectionId::new(),
            tx,
            Arc::clone(&fx.games),
            Arc::clone(&fx.connections),
        );
        let (mut bob, mut rx_b) = fx.handler("1000");
        slow.handle(join("1000", "p1", "Slow")).await;
        slow.handle(ClientMessage::SelectCard {
            player_id: "p1".into(),
            card: CardGenerator::default().generate(),
        })
        .await;
        // Slow's single slot still holds its own roster, so Bob's join evicts it
        bob.handle(join("1000", "p2", "Bob")).await;
        match rx_b.try_recv() {
            Ok(ServerMessage::RosterUpdate { players }) => assert_eq!(players.len(), 2),
            other => panic!("expected join roster, got {:?}", other),
        }
        match rx_b.try_recv() {
            Ok(ServerMessage::RosterUpdate { players }) => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].name, "Bob");
            }
            other => panic!("expected roster after eviction, got {:?}", other),
        }
        assert!(!fx.connections.name_taken(&session, "Slow").await);

        assert!(!slow.handle(chat("still here")).await);
        assert!(slow.is_closed());
        assert!(fx.games.get_card(&session, "p1").await.is_none());
        assert!(rx_b.try_recv().is_err(), "evicted chat must not reach the game");
    }

    #[tokio::test]
    async fn test_leave_before_join_closes_quietly() {
        let fx = Fixture::new("1000").await;
        let (mut handler, mut rx) = fx.handler("1000");
        assert!(!handler.handle(ClientMessage::Leave).await);
        assert!(handler.is_closed());
        assert!(rx.try_recv().is_err());
    }
}

//! TombalaServer: shared application state and game operations
//!
//! Bundles the configuration and both registries, and implements the
//! request-level operations an HTTP front end calls: admin-gated create,
//! draw and remove, card options, and validated number closing with the
//! resulting announcements.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::card::{Card, CardGenerator};
use crate::config::Config;
use crate::connections::ConnectionRegistry;
use crate::error::AppError;
use crate::game::CloseOutcome;
use crate::message::ServerMessage;
use crate::protocol::SessionProtocolHandler;
use crate::registry::{GameSummary, SessionRegistry};
use crate::types::{in_range, ConnectionId, Number, SessionId};

/// Result of a successful draw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawResult {
    pub number: Number,
    /// All drawn numbers in draw order, including `number`
    pub drawn_numbers: Vec<Number>,
}

/// Shared server state
pub struct TombalaServer {
    config: Config,
    games: Arc<SessionRegistry>,
    connections: Arc<ConnectionRegistry>,
    cards: CardGenerator,
}

impl TombalaServer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            games: Arc::new(SessionRegistry::new()),
            connections: Arc::new(ConnectionRegistry::new()),
            cards: CardGenerator::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn games(&self) -> &Arc<SessionRegistry> {
        &self.games
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Check the admin API key
    pub fn authorize(&self, api_key: Option<&str>) -> Result<(), AppError> {
        match api_key {
            Some(key) if key == self.config.admin_api_key => Ok(()),
            _ => Err(AppError::Unauthorized),
        }
    }

    /// Create a game, with a random id unless one is requested
    pub async fn create_game(
        &self,
        api_key: Option<&str>,
        requested: Option<&str>,
    ) -> Result<SessionId, AppError> {
        self.authorize(api_key).inspect_err(|_| {
            warn!("Game creation rejected: invalid or missing API key");
        })?;
        self.games.create(requested).await
    }

    pub async fn remove_game(&self, api_key: Option<&str>, id: &SessionId) -> Result<bool, AppError> {
        self.authorize(api_key)?;
        Ok(self.games.remove(id).await)
    }

    pub async fn game_exists(&self, id: &SessionId) -> bool {
        self.games.exists(id).await
    }

    pub async fn list_games(&self) -> Vec<GameSummary> {
        self.games.list().await
    }

    /// Draw a number and announce it to everyone in the game
    pub async fn draw_number(
        &self,
        api_key: Option<&str>,
        id: &SessionId,
    ) -> Result<DrawResult, AppError> {
        self.authorize(api_key).inspect_err(|_| {
            warn!("Draw in game {} rejected: invalid or missing API key", id);
        })?;

        let (number, drawn_numbers) = self.games.draw_with_history(id).await?;
        info!("Game {}: number {} drawn (total drawn: {})", id, number, drawn_numbers.len());

        self.connections
            .broadcast(
                id,
                &ServerMessage::NumberDrawn {
                    number,
                    drawn_numbers: drawn_numbers.clone(),
                },
            )
            .await;

        Ok(DrawResult {
            number,
            drawn_numbers,
        })
    }

    /// Fresh cards for a player to choose from
    pub async fn card_options(&self, id: &SessionId) -> Result<Vec<Card>, AppError> {
        if !self.games.exists(id).await {
            return Err(AppError::GameNotFound(id.clone()));
        }
        Ok(self.cards.generate_many(self.config.card_options))
    }

    pub async fn closed_numbers(&self, id: &SessionId, player: &str) -> Result<Vec<Number>, AppError> {
        if !self.games.exists(id).await {
            return Err(AppError::GameNotFound(id.clone()));
        }
        Ok(self.games.closed_numbers(id, player).await)
    }

    /// Close a number on a player's card
    ///
    /// The number must be on the card and already drawn. A successful close
    /// is announced, followed by a row and/or full-card announcement when
    /// this close completed one.
    pub async fn close_number(
        &self,
        id: &SessionId,
        player: &str,
        number: u32,
    ) -> Result<CloseOutcome, AppError> {
        if !self.games.exists(id).await {
            return Err(AppError::GameNotFound(id.clone()));
        }
        if !in_range(number) {
            return Err(AppError::NumberOutOfRange(number));
        }
        let number = number as Number;

        let outcome = self.games.close_validated(id, player, number).await?;
        let CloseOutcome::Closed {
            completed_row,
            full_win,
        } = outcome
        else {
            return Ok(outcome);
        };

        let name = self
            .connections
            .username(id, player)
            .await
            .unwrap_or_else(|| "Unknown".to_string());
        info!("Game {}: '{}' closed number {}", id, name, number);
        self.announce(id, format!("{} closed number {}", name, number)).await;

        if let Some(row) = completed_row {
            info!("Game {}: '{}' completed a çinko (row {})", id, name, row + 1);
            self.announce(id, format!("{} completed a çinko", name)).await;
        }
        if full_win {
            info!("Game {}: '{}' completed TOMBALA", id, name);
            self.announce(id, format!("{} completed TOMBALA!", name)).await;
        }

        Ok(outcome)
    }

    /// Protocol handler for a new connection to the given game
    pub fn new_handler(
        &self,
        session: SessionId,
        connection_id: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> SessionProtocolHandler {
        SessionProtocolHandler::new(
            session,
            connection_id,
            sender,
            Arc::clone(&self.games),
            Arc::clone(&self.connections),
        )
        .with_card_layout(*self.cards.layout())
    }

    async fn announce(&self, id: &SessionId, text: String) {
        self.connections
            .broadcast(id, &ServerMessage::system(text))
            .await;
    }
}

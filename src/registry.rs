//! Session registry
//!
//! Owns every live game. The id map sits behind an `RwLock` that is held
//! only long enough to look up a game handle; each game has its own
//! `Mutex`, so operations on one game are linearizable and different
//! games never contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::card::Card;
use crate::error::AppError;
use crate::game::{CloseOutcome, Game};
use crate::types::{Number, SessionId};

/// Retry budget when picking a random free game id
const MAX_ID_ATTEMPTS: usize = 100;

/// Snapshot of a game for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSummary {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub drawn_count: usize,
    pub player_count: usize,
}

/// Registry of all live games
#[derive(Debug, Default)]
pub struct SessionRegistry {
    games: RwLock<HashMap<SessionId, Arc<Mutex<Game>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn game(&self, id: &SessionId) -> Option<Arc<Mutex<Game>>> {
        self.games.read().await.get(id).cloned()
    }

    /// Create a game with the requested id, or a random free 4-digit id
    pub async fn create(&self, requested: Option<&str>) -> Result<SessionId, AppError> {
        let mut games = self.games.write().await;

        let id = match requested {
            Some(raw) => {
                let id = SessionId::parse(raw)
                    .ok_or_else(|| AppError::InvalidGameId(raw.to_string()))?;
                if games.contains_key(&id) {
                    return Err(AppError::GameAlreadyExists(id));
                }
                id
            }
            None => (0..MAX_ID_ATTEMPTS)
                .map(|_| SessionId::generate())
                .find(|id| !games.contains_key(id))
                .ok_or(AppError::GameIdsExhausted)?,
        };

        games.insert(id.clone(), Arc::new(Mutex::new(Game::new(id.clone()))));
        info!("Game {} created (total games: {})", id, games.len());
        Ok(id)
    }

    pub async fn exists(&self, id: &SessionId) -> bool {
        self.games.read().await.contains_key(id)
    }

    /// Remove a game; true only if it existed
    pub async fn remove(&self, id: &SessionId) -> bool {
        let removed = self.games.write().await.remove(id).is_some();
        if removed {
            info!("Game {} removed", id);
        }
        removed
    }

    /// All live games, ordered by id
    pub async fn list(&self) -> Vec<GameSummary> {
        let handles: Vec<_> = self.games.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            let game = handle.lock().await;
            summaries.push(GameSummary {
                id: game.id.clone(),
                created_at: game.created_at,
                drawn_count: game.drawn_numbers().len(),
                player_count: game.player_count(),
            });
        }
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Draw the next random number for a game
    pub async fn draw_number(&self, id: &SessionId) -> Result<Number, AppError> {
        let handle = self
            .game(id)
            .await
            .ok_or_else(|| AppError::GameNotFound(id.clone()))?;
        let mut game = handle.lock().await;
        let number = game.draw_number()?;
        debug!("Game {} drew {} ({} drawn)", id, number, game.drawn_numbers().len());
        Ok(number)
    }

    /// Draw a number and return it together with the full draw history,
    /// read under the same lock
    pub async fn draw_with_history(
        &self,
        id: &SessionId,
    ) -> Result<(Number, Vec<Number>), AppError> {
        let handle = self
            .game(id)
            .await
            .ok_or_else(|| AppError::GameNotFound(id.clone()))?;
        let mut game = handle.lock().await;
        let number = game.draw_number()?;
        Ok((number, game.drawn_numbers().to_vec()))
    }

    /// Drawn numbers in draw order; empty for unknown games
    pub async fn drawn_numbers(&self, id: &SessionId) -> Vec<Number> {
        match self.game(id).await {
            Some(handle) => handle.lock().await.drawn_numbers().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn is_drawn(&self, id: &SessionId, number: Number) -> bool {
        match self.game(id).await {
            Some(handle) => handle.lock().await.is_drawn(number),
            None => false,
        }
    }

    /// Store a card for a player; false if the game does not exist
    pub async fn set_card(&self, id: &SessionId, player: &str, card: Card) -> bool {
        match self.game(id).await {
            Some(handle) => {
                handle.lock().await.set_card(player, card);
                true
            }
            None => false,
        }
    }

    /// Store a card and reset the player's bookkeeping if it differs in any
    /// way (id, numbers, theme) from the card they held before. Returns None if the game does not exist,
    /// otherwise whether a reset happened.
    pub async fn replace_card(&self, id: &SessionId, player: &str, card: Card) -> Option<bool> {
        let handle = self.game(id).await?;
        let mut game = handle.lock().await;
        let changed = game.card(player) != Some(&card);
        game.set_card(player, card);
        if changed {
            game.reset_player(player);
        }
        Some(changed)
    }

    pub async fn get_card(&self, id: &SessionId, player: &str) -> Option<Card> {
        let handle = self.game(id).await?;
        let game = handle.lock().await;
        game.card(player).cloned()
    }

    pub async fn remove_card(&self, id: &SessionId, player: &str) -> bool {
        match self.game(id).await {
            Some(handle) => handle.lock().await.remove_card(player),
            None => false,
        }
    }

    /// Mark a number closed for a player
    ///
    /// The caller validates that the number is drawn and on the player's
    /// card. Returns false if the game is missing or the number was already
    /// closed.
    pub async fn close_number(&self, id: &SessionId, player: &str, number: Number) -> bool {
        match self.game(id).await {
            Some(handle) => handle.lock().await.close_number(player, number),
            None => false,
        }
    }

    /// Check the card and draw history, close the number, and run the row
    /// and win checks, all under one lock of the game
    pub async fn close_validated(
        &self,
        id: &SessionId,
        player: &str,
        number: Number,
    ) -> Result<CloseOutcome, AppError> {
        let handle = self
            .game(id)
            .await
            .ok_or_else(|| AppError::GameNotFound(id.clone()))?;
        let mut game = handle.lock().await;
        game.close_validated(player, number)
    }

    pub async fn closed_numbers(&self, id: &SessionId, player: &str) -> Vec<Number> {
        match self.game(id).await {
            Some(handle) => handle.lock().await.closed_numbers(player),
            None => Vec::new(),
        }
    }

    /// Lowest not-yet-announced completed row, recorded as announced
    pub async fn check_row_completion(&self, id: &SessionId, player: &str) -> Option<usize> {
        let handle = self.game(id).await?;
        let mut game = handle.lock().await;
        game.check_row_completion(player)
    }

    /// True only the first time the player's whole card is closed
    pub async fn check_full_win(&self, id: &SessionId, player: &str) -> bool {
        match self.game(id).await {
            Some(handle) => handle.lock().await.check_full_win(player),
            None => false,
        }
    }

    pub async fn clear_closed_numbers(&self, id: &SessionId, player: &str) {
        if let Some(handle) = self.game(id).await {
            handle.lock().await.clear_closed_numbers(player);
        }
    }

    pub async fn clear_completed_rows(&self, id: &SessionId, player: &str) {
        if let Some(handle) = self.game(id).await {
            handle.lock().await.clear_completed_rows(player);
        }
    }

    pub async fn clear_win_status(&self, id: &SessionId, player: &str) {
        if let Some(handle) = self.game(id).await {
            handle.lock().await.clear_win_status(player);
        }
    }

    /// Clear closed numbers, completed rows, and win status for a player
    pub async fn reset_player(&self, id: &SessionId, player: &str) {
        if let Some(handle) = self.game(id).await {
            handle.lock().await.reset_player(player);
        }
    }
}

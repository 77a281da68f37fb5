//! Game struct definition
//!
//! Per-session state: drawn numbers, player cards, and the bookkeeping
//! behind row (çinko) and full-card (tombala) announcements.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;

use crate::card::Card;
use crate::error::AppError;
use crate::types::{Number, PlayerId, SessionId, MAX_NUMBER, MIN_NUMBER};

/// Result of a close-number request
///
/// Only `Closed` changes state; the rest report why nothing happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed {
        /// Row newly completed by this close (çinko)
        completed_row: Option<usize>,
        /// First time the whole card is closed (tombala)
        full_win: bool,
    },
    AlreadyClosed,
    NotOnCard,
    NotDrawn,
}

impl CloseOutcome {
    pub fn is_closed(&self) -> bool {
        matches!(self, CloseOutcome::Closed { .. })
    }
}

/// A single Tombala game
///
/// Not synchronized on its own; `SessionRegistry` keeps each game behind
/// its own lock.
#[derive(Debug)]
pub struct Game {
    /// Game id for identification
    pub id: SessionId,
    /// Game creation time
    pub created_at: DateTime<Utc>,
    /// Drawn numbers in draw order
    drawn: Vec<Number>,
    drawn_set: HashSet<Number>,
    cards: HashMap<PlayerId, Card>,
    closed: HashMap<PlayerId, BTreeSet<Number>>,
    completed_rows: HashMap<PlayerId, BTreeSet<usize>>,
    winners: HashSet<PlayerId>,
}

impl Game {
    /// Create a new empty game
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            drawn: Vec::new(),
            drawn_set: HashSet::new(),
            cards: HashMap::new(),
            closed: HashMap::new(),
            completed_rows: HashMap::new(),
            winners: HashSet::new(),
        }
    }

    /// Draw a random number that has not been drawn yet
    pub fn draw_number(&mut self) -> Result<Number, AppError> {
        let available: Vec<Number> = (MIN_NUMBER..=MAX_NUMBER)
            .filter(|n| !self.drawn_set.contains(n))
            .collect();
        let number = *available
            .choose(&mut rand::thread_rng())
            .ok_or(AppError::AllNumbersDrawn)?;
        self.drawn.push(number);
        self.drawn_set.insert(number);
        Ok(number)
    }

    pub fn drawn_numbers(&self) -> &[Number] {
        &self.drawn
    }

    pub fn is_drawn(&self, number: Number) -> bool {
        self.drawn_set.contains(&number)
    }

    pub fn player_count(&self) -> usize {
        self.cards.len()
    }

    /// Store a player's card, replacing any previous one
    pub fn set_card(&mut self, player: &str, card: Card) -> Option<Card> {
        self.cards.insert(player.to_string(), card)
    }

    pub fn card(&self, player: &str) -> Option<&Card> {
        self.cards.get(player)
    }

    pub fn remove_card(&mut self, player: &str) -> bool {
        self.cards.remove(player).is_some()
    }

    /// Mark a number closed for a player
    ///
    /// Returns false if it was already closed.
    pub fn close_number(&mut self, player: &str, number: Number) -> bool {
        self.closed.entry(player.to_string()).or_default().insert(number)
    }

    /// Validate and close a number, then run the row and win checks
    ///
    /// The number must be on the player's current card and already drawn.
    pub fn close_validated(&mut self, player: &str, number: Number) -> Result<CloseOutcome, AppError> {
        let card = self.cards.get(player).ok_or(AppError::CardNotSelected)?;
        if !card.contains(number) {
            return Ok(CloseOutcome::NotOnCard);
        }
        if !self.is_drawn(number) {
            return Ok(CloseOutcome::NotDrawn);
        }
        if !self.close_number(player, number) {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        Ok(CloseOutcome::Closed {
            completed_row: self.check_row_completion(player),
            full_win: self.check_full_win(player),
        })
    }

    pub fn is_closed(&self, player: &str, number: Number) -> bool {
        self.closed
            .get(player)
            .is_some_and(|closed| closed.contains(&number))
    }

    /// Closed numbers for a player in ascending order
    pub fn closed_numbers(&self, player: &str) -> Vec<Number> {
        self.closed
            .get(player)
            .map(|closed| closed.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Report the lowest newly completed row, recording it as announced
    pub fn check_row_completion(&mut self, player: &str) -> Option<usize> {
        let card = self.cards.get(player)?;
        let closed = self.closed.get(player)?;
        let announced = self.completed_rows.entry(player.to_string()).or_default();

        let row = (0..card.rows.len()).find(|&r| {
            !announced.contains(&r)
                && card.row_numbers(r).next().is_some()
                && card.row_numbers(r).all(|n| closed.contains(&n))
        })?;
        announced.insert(row);
        Some(row)
    }

    /// True exactly once per player, when every number on the card is closed
    pub fn check_full_win(&mut self, player: &str) -> bool {
        if self.winners.contains(player) {
            return false;
        }
        let (Some(card), Some(closed)) = (self.cards.get(player), self.closed.get(player)) else {
            return false;
        };
        let mut numbers = card.numbers().peekable();
        if numbers.peek().is_none() || !numbers.all(|n| closed.contains(&n)) {
            return false;
        }
        self.winners.insert(player.to_string());
        true
    }

    pub fn completed_rows(&self, player: &str) -> Vec<usize> {
        self.completed_rows
            .get(player)
            .map(|rows| rows.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_won(&self, player: &str) -> bool {
        self.winners.contains(player)
    }

    pub fn clear_closed_numbers(&mut self, player: &str) {
        self.closed.remove(player);
    }

    pub fn clear_completed_rows(&mut self, player: &str) {
        self.completed_rows.remove(player);
    }

    pub fn clear_win_status(&mut self, player: &str) {
        self.winners.remove(player);
    }

    /// Clear all per-player bookkeeping (used on card change)
    pub fn reset_player(&mut self, player: &str) {
        self.clear_closed_numbers(player);
        self.clear_completed_rows(player);
        self.clear_win_status(player);
    }
}

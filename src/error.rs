//! Error types for the Tombala server
//!
//! Defines application-level errors, their classification, and
//! per-connection send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::SessionId;

/// Application-level errors
///
/// Covers both fatal transport errors (connection termination) and
/// business errors (converted to an error message for the client or an
/// error response at the boundary).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Send to a dead or saturated connection
    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    #[error("Game with ID '{0}' does not exist")]
    GameNotFound(SessionId),

    #[error("Game with ID '{0}' already exists")]
    GameAlreadyExists(SessionId),

    #[error("Invalid game ID '{0}'")]
    InvalidGameId(String),

    /// No free 4-digit id found within the retry budget
    #[error("Unable to generate unique game ID")]
    GameIdsExhausted,

    #[error("All numbers (1-90) have already been drawn")]
    AllNumbersDrawn,

    #[error("No card selected")]
    CardNotSelected,

    #[error("Invalid card: {0}")]
    InvalidCard(String),

    #[error("Username '{0}' is already taken in this game")]
    NameTaken(String),

    #[error("Game ID mismatch. Expected: {expected}, got: {got}")]
    GameIdMismatch { expected: SessionId, got: String },

    #[error("User ID mismatch")]
    PlayerIdMismatch,

    #[error("Already joined")]
    AlreadyJoined,

    #[error("Not joined")]
    NotJoined,

    /// Admin API key missing or wrong
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Number {0} is out of range")]
    NumberOutOfRange(u32),

    #[error("Invalid message format")]
    InvalidMessage,

    #[error("Unknown message type")]
    UnknownMessageType,
}

/// Coarse error classification used at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthorized,
    Exhausted,
    InvalidInput,
    TransportFailure,
}

impl AppError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::WebSocket(_) | AppError::Io(_) | AppError::Send(_) => {
                ErrorKind::TransportFailure
            }
            AppError::GameNotFound(_) | AppError::CardNotSelected => ErrorKind::NotFound,
            AppError::GameAlreadyExists(_)
            | AppError::NameTaken(_)
            | AppError::AlreadyJoined => ErrorKind::Conflict,
            AppError::GameIdMismatch { .. }
            | AppError::PlayerIdMismatch
            | AppError::NotJoined
            | AppError::Unauthorized => ErrorKind::Unauthorized,
            AppError::GameIdsExhausted | AppError::AllNumbersDrawn => ErrorKind::Exhausted,
            AppError::Json(_)
            | AppError::InvalidGameId(_)
            | AppError::InvalidCard(_)
            | AppError::NumberOutOfRange(_)
            | AppError::InvalidMessage
            | AppError::UnknownMessageType => ErrorKind::InvalidInput,
        }
    }
}

/// Message send errors
///
/// Occurs when attempting to queue a message for a connection whose
/// write side is gone or whose buffer is full. Both are hard failures.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The connection's outbound buffer is full
    #[error("Channel full")]
    ChannelFull,
}

//! Client struct definition
//!
//! Represents a joined connection: which player it belongs to and the
//! channel feeding its WebSocket write task.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::SendError;
use crate::message::{PlayerInfo, ServerMessage};
use crate::types::{ConnectionId, PlayerId};

/// Joined connection information
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Player id supplied at join time
    pub player_id: PlayerId,
    /// Display name, unique within the game
    pub name: String,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client record
    pub fn new(
        id: ConnectionId,
        player_id: PlayerId,
        name: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            id,
            player_id,
            name,
            sender,
        }
    }

    /// Queue a message for this client without waiting
    ///
    /// A closed channel or a full buffer are both reported as errors.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Roster entry for this client
    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            player_id: self.player_id.clone(),
            name: self.name.clone(),
        }
    }
}

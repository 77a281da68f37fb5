//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::error::AppError;
use crate::types::Number;

/// Player id and name used for server-generated chat lines
pub const SYSTEM_SENDER: &str = "SYSTEM";

/// Client → Server message
///
/// Tagged by `type` with snake_case naming. Unrecognized types decode as
/// `Unknown` so they can be rejected without dropping the connection.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a game as a named player
    #[serde(alias = "join_game", rename_all = "camelCase")]
    Join {
        #[serde(alias = "gameId")]
        session_id: String,
        #[serde(alias = "userId")]
        player_id: String,
        #[serde(alias = "username")]
        name: String,
    },
    /// Leave the game and close the connection
    #[serde(alias = "leave_game")]
    Leave,
    /// Chat line; identity fields are ignored and stamped server-side
    #[serde(rename_all = "camelCase")]
    Chat {
        #[serde(alias = "message")]
        text: String,
        #[serde(default, alias = "userId")]
        player_id: Option<String>,
        #[serde(default, alias = "username")]
        name: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// Pick one of the offered cards
    #[serde(rename_all = "camelCase")]
    SelectCard {
        #[serde(alias = "userId")]
        player_id: String,
        card: Card,
    },
    #[serde(other)]
    Unknown,
}

/// Entry of a roster update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub player_id: String,
    pub name: String,
}

/// Server → Client message
///
/// Tagged by `type` with snake_case naming; fields are camelCase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Chat line from a player or the system
    #[serde(rename_all = "camelCase")]
    Chat {
        player_id: String,
        name: String,
        text: String,
        timestamp: i64,
    },
    /// A number was drawn
    #[serde(rename_all = "camelCase")]
    NumberDrawn {
        number: Number,
        drawn_numbers: Vec<Number>,
    },
    /// Current players connected to the game
    RosterUpdate { players: Vec<PlayerInfo> },
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    /// Server-authored chat line stamped with the current time
    pub fn system(text: impl Into<String>) -> Self {
        ServerMessage::Chat {
            player_id: SYSTEM_SENDER.to_string(),
            name: SYSTEM_SENDER.to_string(),
            text: text.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Error codes for ServerMessage::Error
///
/// Represents different error scenarios that can be communicated to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Non-existent game
    GameNotFound,
    /// Game id in the join message differs from the connection's game
    GameIdMismatch,
    /// Display name already used in this game
    NameTaken,
    /// Join sent twice
    AlreadyJoined,
    /// Action attempted before joining
    NotJoined,
    /// Player id does not match the joined player
    PlayerIdMismatch,
    /// Card breaks the layout rules
    InvalidCard,
    /// Message type not understood
    UnknownMessageType,
    /// Invalid message format
    InvalidMessage,
    /// Anything else
    Internal,
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::GameNotFound(_) => ErrorCode::GameNotFound,
            AppError::GameIdMismatch { .. } => ErrorCode::GameIdMismatch,
            AppError::NameTaken(_) => ErrorCode::NameTaken,
            AppError::AlreadyJoined => ErrorCode::AlreadyJoined,
            AppError::NotJoined => ErrorCode::NotJoined,
            AppError::PlayerIdMismatch => ErrorCode::PlayerIdMismatch,
            AppError::InvalidCard(_) => ErrorCode::InvalidCard,
            AppError::UnknownMessageType => ErrorCode::UnknownMessageType,
            AppError::InvalidMessage | AppError::Json(_) => ErrorCode::InvalidMessage,
            _ => ErrorCode::Internal,
        };
        let message = match &err {
            AppError::GameNotFound(id) => format!(
                "Game with ID '{}' does not exist. Please create the game first.",
                id
            ),
            AppError::NameTaken(name) => format!(
                "Username '{}' is already taken in this game. Please choose a different nickname.",
                name
            ),
            AppError::AlreadyJoined => "Already joined. Cannot join again.".to_string(),
            AppError::NotJoined => "Not authenticated. Please join game first.".to_string(),
            AppError::Json(_) => "Invalid message format".to_string(),
            _ => err.to_string(),
        };
        ServerMessage::Error { code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_deserialize() {
        let json = r#"{"type": "join", "sessionId": "1000", "playerId": "p1", "name": "Alice"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Join {
                session_id,
                player_id,
                name,
            } => {
                assert_eq!(session_id, "1000");
                assert_eq!(player_id, "p1");
                assert_eq!(name, "Alice");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_join_game_alias() {
        let json = r#"{"type": "join_game", "gameId": "1000", "userId": "p1", "username": "Alice"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Join { .. }));
    }

    #[test]
    fn test_chat_identity_optional() {
        let json = r#"{"type": "chat", "text": "hi"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Chat {
                text, player_id, ..
            } => {
                assert_eq!(text, "hi");
                assert!(player_id.is_none());
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_leave_and_unknown() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "leave"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Leave));

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "dance"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "number_drawn", "number": 5}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));
    }

    #[test]
    fn test_malformed_join_fails() {
        let res = serde_json::from_str::<ClientMessage>(r#"{"type": "join", "name": "A"}"#);
        assert!(res.is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn test_number_drawn_serialize() {
        let msg = ServerMessage::NumberDrawn {
            number: 17,
            drawn_numbers: vec![4, 17],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"number_drawn\""));
        assert!(json.contains("\"drawnNumbers\":[4,17]"));
    }

    #[test]
    fn test_roster_serialize() {
        let msg = ServerMessage::RosterUpdate {
            players: vec![PlayerInfo {
                player_id: "p1".into(),
                name: "Alice".into(),
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"roster_update\""));
        assert!(json.contains("\"playerId\":\"p1\""));
    }

    #[test]
    fn test_error_code_serialize() {
        let msg: ServerMessage = AppError::NameTaken("Alice".into()).into();
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"code\":\"name_taken\""));
        assert!(json.contains("Alice"));
    }

    #[test]
    fn test_system_message() {
        match ServerMessage::system("Alice closed number 17") {
            ServerMessage::Chat {
                player_id, name, ..
            } => {
                assert_eq!(player_id, SYSTEM_SENDER);
                assert_eq!(name, SYSTEM_SENDER);
            }
            _ => panic!("Wrong variant"),
        }
    }
}

//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake bound to a
//! game through the `/ws/game/{gameId}` path, message parsing, and the
//! split read/write loop around a `SessionProtocolHandler`.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::server::TombalaServer;
use crate::types::{ConnectionId, SessionId};

/// Path prefix for game WebSocket endpoints
const GAME_PATH_PREFIX: &str = "/ws/game/";

/// Extract the game id from a request path like `/ws/game/4821`
pub fn session_from_path(path: &str) -> Option<SessionId> {
    let rest = path.strip_prefix(GAME_PATH_PREFIX)?;
    SessionId::parse(rest.trim_end_matches('/'))
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, binds the connection to the game in
/// the request path, and runs it until the client leaves or disconnects.
pub async fn handle_connection(stream: TcpStream, server: Arc<TombalaServer>) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, remembering the request path
    let mut path = String::new();
    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            path = req.uri().path().to_string();
            Ok(resp)
        },
    )
    .await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let Some(session) = session_from_path(&path) else {
        warn!("Rejecting connection from {}: no game id in path '{}'", peer_addr, path);
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: "Missing game ID".into(),
        };
        let _ = ws_sender.send(Message::Close(Some(frame))).await;
        return Ok(());
    };

    let connection_id = ConnectionId::new();
    info!("Connection {} for game {} from {}", connection_id, session, peer_addr);

    // Channel for server -> client messages
    let (msg_tx, mut msg_rx) =
        mpsc::channel::<ServerMessage>(server.config().channel_capacity);
    let mut handler = server.new_handler(session.clone(), connection_id, msg_tx);

    // Spawn write task (ServerMessage -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended for connection");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Read loop (WebSocket -> protocol handler)
    let write_finished = loop {
        tokio::select! {
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                if !handler.handle(msg).await {
                                    debug!("Connection {} closing after leave", connection_id);
                                    break false;
                                }
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", connection_id, e);
                                handler.send_error("Invalid message format");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Connection {} closed by client", connection_id);
                        break false;
                    }
                    Some(Ok(_)) => {
                        // Binary, ping and pong frames; pongs are answered by tungstenite
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error for {}: {}", connection_id, e);
                        break false;
                    }
                }
            }
            _ = &mut write_task => {
                debug!("Write task completed for {}", connection_id);
                break true;
            }
        }
    };

    if !handler.is_closed() {
        handler.on_disconnect().await;
    }
    // Dropping the handler releases the last sender so the write task can finish
    drop(handler);
    if !write_finished {
        let _ = write_task.await;
    }

    info!("Connection {} for game {} closed", connection_id, session);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_path() {
        assert_eq!(session_from_path("/ws/game/4821"), Some(SessionId("4821".into())));
        assert_eq!(session_from_path("/ws/game/4821/"), Some(SessionId("4821".into())));
        assert!(session_from_path("/ws/game/").is_none());
        assert!(session_from_path("/ws/game/abcd").is_none());
        assert!(session_from_path("/chat").is_none());
    }
}

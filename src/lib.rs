//! Tombala Session Server Library
//!
//! A multiplayer Tombala (number bingo) server built with tokio-tungstenite.
//! A presenter draws numbers, players pick generated cards and close drawn
//! numbers, and every participant of a game is kept in sync over a
//! WebSocket channel.
//!
//! # Features
//! - Card generation with column coverage and ascending columns
//! - 4-digit game ids
//! - Random draws without repeats, in draw order
//! - Row (çinko) and full-card (tombala) detection, announced once
//! - Live roster and chat per game
//! - Dead connections evicted during broadcasts
//!
//! # Architecture
//! Shared services behind `Arc`:
//! - `SessionRegistry` owns every game, one lock per game
//! - `ConnectionRegistry` owns joined connections and fans out messages
//! - `SessionProtocolHandler` runs the per-connection state machine
//! - `TombalaServer` bundles both registries with the game operations
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tombala_server::{handle_connection, Config, TombalaServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Arc::new(TombalaServer::new(Config::default()));
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, Arc::clone(&server)));
//!     }
//! }
//! ```

pub mod card;
pub mod client;
pub mod config;
pub mod connections;
pub mod console;
pub mod error;
pub mod game;
pub mod handler;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use card::{Card, CardGenerator, CardLayout};
pub use client::Client;
pub use config::Config;
pub use connections::ConnectionRegistry;
pub use error::{AppError, ErrorKind, SendError};
pub use game::{CloseOutcome, Game};
pub use handler::handle_connection;
pub use message::{ClientMessage, ErrorCode, PlayerInfo, ServerMessage};
pub use protocol::{HandlerState, SessionProtocolHandler};
pub use registry::{GameSummary, SessionRegistry};
pub use server::{DrawResult, TombalaServer};
pub use types::{ConnectionId, Number, PlayerId, SessionId};

//! Presenter console
//!
//! Line commands read from stdin that drive games on this server:
//! `create [id]`, `draw <id>`, `remove <id>`, `games`, `help`.
//! The console is local, so it acts with the configured admin key.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use crate::error::AppError;
use crate::server::TombalaServer;
use crate::types::SessionId;

const HELP: &str = "commands: create [id] | draw <id> | remove <id> | games | help";

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(Option<String>),
    Draw(SessionId),
    Remove(SessionId),
    Games,
    Help,
}

impl Command {
    /// Parse one input line; `None` for blank lines
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let mut parts = line.split_whitespace();
        let verb = parts.next()?;
        let arg = parts.next();

        let game = |arg: Option<&str>| {
            arg.and_then(SessionId::parse)
                .ok_or_else(|| format!("'{}' needs a 4-digit game id", verb))
        };

        Some(match verb {
            "create" => Ok(Command::Create(arg.map(str::to_string))),
            "draw" => game(arg).map(Command::Draw),
            "remove" => game(arg).map(Command::Remove),
            "games" => Ok(Command::Games),
            "help" => Ok(Command::Help),
            other => Err(format!("unknown command '{}'", other)),
        })
    }
}

/// Execute a command and describe the result
pub async fn execute(server: &TombalaServer, command: Command) -> Result<String, AppError> {
    let key = Some(server.config().admin_api_key.as_str());
    match command {
        Command::Create(id) => {
            let id = server.create_game(key, id.as_deref()).await?;
            Ok(format!("game {} created", id))
        }
        Command::Draw(id) => {
            let draw = server.draw_number(key, &id).await?;
            Ok(format!(
                "game {}: drew {} ({} drawn)",
                id,
                draw.number,
                draw.drawn_numbers.len()
            ))
        }
        Command::Remove(id) => {
            if server.remove_game(key, &id).await? {
                Ok(format!("game {} removed", id))
            } else {
                Err(AppError::GameNotFound(id))
            }
        }
        Command::Games => {
            let games = server.list_games().await;
            if games.is_empty() {
                return Ok("no games".to_string());
            }
            Ok(games
                .iter()
                .map(|g| {
                    format!(
                        "{}  created {}  drawn {}  cards {}",
                        g.id,
                        g.created_at.format("%H:%M:%S"),
                        g.drawn_count,
                        g.player_count
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Command::Help => Ok(HELP.to_string()),
    }
}

/// Read commands from stdin until it closes
pub async fn run(server: Arc<TombalaServer>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Presenter console ready ({})", HELP);

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Console read failed: {}", e);
                break;
            }
        };

        match Command::parse(&line) {
            None => {}
            Some(Err(msg)) => println!("{}", msg),
            Some(Ok(command)) => match execute(&server, command).await {
                Ok(out) => println!("{}", out),
                Err(e) => println!("error: {}", e),
            },
        }
    }

    info!("Presenter console closed");
}

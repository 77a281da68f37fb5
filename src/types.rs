//! Basic type definitions for the Tombala server
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based unique connection identifier
//! - `SessionId`: 4-digit numeric game identifier

use rand::Rng;
use uuid::Uuid;

/// A number on a card or in the draw pouch (1..=90)
pub type Number = u8;

/// Player identifier supplied by the client at join time
pub type PlayerId = String;

/// Lowest number in the draw pouch
pub const MIN_NUMBER: Number = 1;

/// Highest number in the draw pouch
pub const MAX_NUMBER: Number = 90;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe connection identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Game session identifier (4-digit numeric string, 1000..=9999)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a random 4-digit session id
    pub fn generate() -> Self {
        let n: u16 = rand::thread_rng().gen_range(1000..=9999);
        Self(n.to_string())
    }

    /// Parse a client or admin supplied id
    ///
    /// Returns None unless the input is exactly four ASCII digits.
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        if id.len() == 4 && id.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(id.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// True if the number is inside the draw pouch range
pub fn in_range(number: u32) -> bool {
    (MIN_NUMBER as u32..=MAX_NUMBER as u32).contains(&number)
}

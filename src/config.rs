//! Server configuration
//!
//! Layered with the `config` crate: built-in defaults, then `TOMBALA_*`
//! environment variables. The first command line argument overrides the
//! bind address.

use std::env;

use ::config::{ConfigError, Environment, Map};
use serde::Deserialize;
use tracing::warn;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Admin key used when none is configured
pub const DEFAULT_ADMIN_API_KEY: &str = "tombala-admin";

/// Per-connection outbound buffer size
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Cards offered to a player to choose from
pub const DEFAULT_CARD_OPTIONS: usize = 3;

const ENV_PREFIX: &str = "TOMBALA";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    /// Shared secret for admin operations (create, draw, remove)
    pub admin_api_key: String,
    pub channel_capacity: usize,
    pub card_options: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            admin_api_key: DEFAULT_ADMIN_API_KEY.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            card_options: DEFAULT_CARD_OPTIONS,
        }
    }
}

impl Config {
    /// Build the configuration from the process environment and the
    /// command line
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::with_prefix(ENV_PREFIX), env::args().nth(1))
    }

    /// Same as `from_env`, reading variables from the given map instead
    pub fn from_vars(vars: Map<String, String>, addr_arg: Option<String>) -> Result<Self, ConfigError> {
        Self::load(Environment::with_prefix(ENV_PREFIX).source(Some(vars)), addr_arg)
    }

    fn load(environment: Environment, addr_arg: Option<String>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder()
            .set_default("bind_addr", DEFAULT_ADDR)?
            .set_default("admin_api_key", DEFAULT_ADMIN_API_KEY)?
            .set_default("channel_capacity", DEFAULT_CHANNEL_CAPACITY as i64)?
            .set_default("card_options", DEFAULT_CARD_OPTIONS as i64)?
            .add_source(environment.try_parsing(true));
        if let Some(addr) = addr_arg {
            builder = builder.set_override("bind_addr", addr)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;

        if config.admin_api_key == DEFAULT_ADMIN_API_KEY {
            warn!("TOMBALA_ADMIN_API_KEY not set, using the default admin key");
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.admin_api_key.is_empty() {
            return Err(ConfigError::Message("admin_api_key must not be empty".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Message("channel_capacity must be positive".into()));
        }
        if self.card_options == 0 {
            return Err(ConfigError::Message("card_options must be positive".into()));
        }
        Ok(())
    }
}

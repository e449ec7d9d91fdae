//! Environment-based configuration.
//!
//! All settings come from environment variables, with `.env` support for
//! local development. API keys decide which trackers get registered at
//! startup: a missing `NEXON_API_KEY` simply means MapleStory tracking is
//! off for this deployment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingVar(&'static str),

    #[error("invalid {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },

    #[error("at least one game API key is required (RIOT_API_KEY or NEXON_API_KEY)")]
    NoGameKeys,

    #[error("home directory not found and DATABASE_PATH not set")]
    HomeDirNotFound,
}

/// Runtime configuration for the daemon.
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub riot_api_key: Option<String>,
    pub nexon_api_key: Option<String>,
    pub database_path: PathBuf,
    pub poll_interval: Duration,
    pub request_spacing: Duration,
    pub throttle_backoff: Duration,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Reads a `.env` file first if one exists (ignored when absent).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let discord_token = require("DISCORD_BOT_TOKEN")?;
        let riot_api_key = optional("RIOT_API_KEY");
        let nexon_api_key = optional("NEXON_API_KEY");

        if riot_api_key.is_none() && nexon_api_key.is_none() {
            return Err(ConfigError::NoGameKeys);
        }

        let database_path = match optional("DATABASE_PATH") {
            Some(p) => PathBuf::from(p),
            None => default_database_path()?,
        };

        let poll_interval = parse_secs(
            "POLL_INTERVAL_SECONDS",
            optional("POLL_INTERVAL_SECONDS"),
            90,
        )?;
        let request_spacing = parse_millis(
            "REQUEST_SPACING_MS",
            optional("REQUEST_SPACING_MS"),
            50,
        )?;
        let throttle_backoff = parse_millis(
            "THROTTLE_BACKOFF_MS",
            optional("THROTTLE_BACKOFF_MS"),
            1000,
        )?;

        Ok(Self {
            discord_token,
            riot_api_key,
            nexon_api_key,
            database_path,
            poll_interval,
            request_spacing,
            throttle_backoff,
        })
    }
}

/// Resolve the default database path: `~/.matchcast/matchcast.db`.
fn default_database_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(".matchcast").join("matchcast.db"))
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::MissingVar(name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Parse a positive integer env value as whole seconds.
fn parse_secs(
    name: &'static str,
    value: Option<String>,
    default: u64,
) -> Result<Duration, ConfigError> {
    parse_positive(name, value, default).map(Duration::from_secs)
}

/// Parse a positive integer env value as milliseconds.
fn parse_millis(
    name: &'static str,
    value: Option<String>,
    default: u64,
) -> Result<Duration, ConfigError> {
    parse_positive(name, value, default).map(Duration::from_millis)
}

fn parse_positive(
    name: &'static str,
    value: Option<String>,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::InvalidVar {
            name,
            reason: "must be a positive integer".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidVar {
            name,
            reason: e.to_string(),
        }),
    }
}

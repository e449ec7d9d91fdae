//! The tracker contract shared by every supported game.
//!
//! A tracker adapts one game's API to three capabilities: resolving a
//! human-entered identifier to a canonical player, summarizing observable
//! state into an opaque string for change detection, and rendering a
//! notification embed when that state changes. Match-based games use the
//! latest match id as the state string; progression games encode their
//! counters (e.g. `lv:280:exp:12345`). The poller only ever compares state
//! strings for equality.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::api::ApiError;

/// Identifier for a supported game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameType {
    Lol,
    Maplestory,
}

impl GameType {
    /// Stable tag used in storage and command input.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Lol => "lol",
            GameType::Maplestory => "maplestory",
        }
    }
}

impl FromStr for GameType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lol" => Ok(GameType::Lol),
            "maplestory" => Ok(GameType::Maplestory),
            _ => Err(()),
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical identity of a player, as resolved from the game's API.
#[derive(Debug, Clone)]
pub struct PlayerInfo {
    /// Stable external key used to query the API (PUUID, OCID, ...).
    pub external_id: String,
    /// Canonical display name.
    pub display_name: String,
    pub game_type: GameType,
}

/// Display information about a registered game.
#[derive(Debug, Clone)]
pub struct GameInfo {
    pub game_type: GameType,
    pub name: String,
    pub description: String,
}

/// A platform-neutral notification embed.
///
/// The messaging sink translates this into the destination platform's wire
/// format (a Discord embed, in the shipped sink).
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    /// 24-bit RGB accent color.
    pub color: u32,
    pub author_name: String,
    pub fields: Vec<NotificationField>,
    pub footer: String,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl NotificationField {
    pub fn inline(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline: true,
        }
    }
}

/// Errors from tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// User-supplied identifier text is syntactically invalid. The message is
    /// shown to the requester verbatim.
    #[error("invalid player id: {0}")]
    InvalidFormat(String),

    /// The upstream lookup found no such player.
    #[error("player not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Upstream(#[from] ApiError),
}

/// Per-game adapter: identity resolution, state summarization, notification
/// rendering.
///
/// Implementations must keep `resolve_player` idempotent and must return a
/// degraded placeholder notification (rather than an error) when the entity
/// referenced by a state string can no longer be fetched, so one stale match
/// id never aborts fan-out for the remaining subscribers.
#[async_trait]
pub trait Tracker: Send + Sync {
    /// Human-readable game name.
    fn name(&self) -> &str;

    fn game_type(&self) -> GameType;

    fn description(&self) -> &str;

    /// Syntactic check of user-supplied identifier text. No I/O.
    fn validate_player_id(&self, input: &str) -> Result<(), TrackerError>;

    /// Resolve a human-entered identifier to the canonical player.
    async fn resolve_player(&self, input: &str) -> Result<PlayerInfo, TrackerError>;

    /// Current observable state as an opaque string. Empty means "no
    /// observable state yet" (e.g. an account with zero match history) and
    /// is not an error.
    async fn current_state(&self, external_id: &str) -> Result<String, TrackerError>;

    /// Render a notification for a state change, re-fetching whatever detail
    /// is needed.
    async fn build_notification(
        &self,
        external_id: &str,
        display_name: &str,
        state: &str,
    ) -> Result<Notification, TrackerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_type_round_trips_through_tag() {
        for game in [GameType::Lol, GameType::Maplestory] {
            assert_eq!(game.as_str().parse::<GameType>(), Ok(game));
        }
    }

    #[test]
    fn test_unknown_tag_fails_to_parse() {
        assert!("valorant".parse::<GameType>().is_err());
        assert!("".parse::<GameType>().is_err());
    }
}

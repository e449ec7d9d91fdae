//! Persistence contract and row models.
//!
//! The poller and the subscription service only ever talk to the
//! [`Repository`] trait, so tests can substitute an in-memory fake and the
//! shipped SQLite implementation stays swappable.

pub mod sqlite;

pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to create database directory: {0}")]
    CreateDir(std::io::Error),
}

/// A player being watched for one game.
#[derive(Debug, Clone)]
pub struct TrackedPlayer {
    pub id: i64,
    /// Stable key used to query the game API (PUUID, OCID, ...).
    pub external_id: String,
    pub display_name: String,
    /// Game-type tag; resolved through the registry at poll time.
    pub game: String,
    /// Last observed state string. Empty means "never observed".
    pub last_state: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert payload for a new tracked player.
#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub external_id: String,
    pub display_name: String,
    pub game: String,
    /// Baseline state captured at registration; "" when unavailable.
    pub last_state: String,
}

/// Links one tracked player to one guild.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: i64,
    pub player_id: i64,
    pub guild_id: String,
    pub registered_by: String,
    pub created_at: String,
}

/// Per-guild delivery configuration.
#[derive(Debug, Clone)]
pub struct GuildSettings {
    pub guild_id: String,
    pub channel_id: String,
    pub created_at: String,
}

/// Persistence operations consumed by the poller and the subscription
/// service.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn list_tracked_players(&self) -> Result<Vec<TrackedPlayer>, StoreError>;

    async fn update_last_state(&self, player_id: i64, state: &str) -> Result<(), StoreError>;

    async fn subscriptions_for_player(
        &self,
        player_id: i64,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// `None` means the guild has not configured a notification channel.
    async fn guild_settings(&self, guild_id: &str) -> Result<Option<GuildSettings>, StoreError>;

    async fn find_player(
        &self,
        external_id: &str,
        game: &str,
    ) -> Result<Option<TrackedPlayer>, StoreError>;

    async fn find_player_by_name(
        &self,
        display_name: &str,
        game: &str,
    ) -> Result<Option<TrackedPlayer>, StoreError>;

    async fn create_player(&self, new: NewPlayer) -> Result<TrackedPlayer, StoreError>;

    /// Returns `false` when the (player, guild) pair is already subscribed.
    async fn add_subscription(
        &self,
        player_id: i64,
        guild_id: &str,
        registered_by: &str,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when no such subscription existed.
    async fn remove_subscription(&self, player_id: i64, guild_id: &str)
        -> Result<bool, StoreError>;

    async fn players_in_guild(&self, guild_id: &str) -> Result<Vec<TrackedPlayer>, StoreError>;

    async fn upsert_guild_settings(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<(), StoreError>;
}
